use crate::models::EngineeredFeature;

const WEIGHT_FREQUENCY: f64 = 0.4;
const WEIGHT_CONSISTENCY: f64 = 0.3;
const WEIGHT_RECENCY: f64 = 0.2;
const WEIGHT_AVG_SCORE: f64 = 0.1;

/// Composite 0-100 engagement score for one (student, domain).
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementScore {
    pub student_id: i32,
    pub domain: String,
    pub score: f64,
}

/// Scores every engineered-feature row on a 0-100 scale.
///
/// Each feature column is min-max normalized against the global extremes
/// of the current batch, then combined with fixed weights. A column with
/// no spread contributes 0 for every row.
pub fn score_engagement(features: &[EngineeredFeature]) -> Vec<EngagementScore> {
    let freq = MinMax::over(features, |f| f.attempt_frequency);
    let consistency = MinMax::over(features, |f| f.consistency_index);
    let recency = MinMax::over(features, |f| f.recency_score);
    let avg = MinMax::over(features, |f| f.avg_score);

    features
        .iter()
        .map(|f| {
            let composite = WEIGHT_FREQUENCY * freq.normalize(f.attempt_frequency)
                + WEIGHT_CONSISTENCY * consistency.normalize(f.consistency_index)
                + WEIGHT_RECENCY * recency.normalize(f.recency_score)
                + WEIGHT_AVG_SCORE * avg.normalize(f.avg_score);
            EngagementScore {
                student_id: f.student_id,
                domain: f.domain.clone(),
                score: composite * 100.0,
            }
        })
        .collect()
}

struct MinMax {
    min: f64,
    max: f64,
}

impl MinMax {
    fn over(features: &[EngineeredFeature], pick: impl Fn(&EngineeredFeature) -> f64) -> MinMax {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for f in features {
            let v = pick(f);
            min = min.min(v);
            max = max.max(v);
        }
        MinMax { min, max }
    }

    fn normalize(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range <= 0.0 {
            0.0
        } else {
            (value - self.min) / range
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(student_id: i32, avg: f64, freq: f64, recency: f64, consistency: f64) -> EngineeredFeature {
        EngineeredFeature {
            student_id,
            domain: "AI/ML".to_string(),
            avg_score: avg,
            attempt_frequency: freq,
            recency_score: recency,
            consistency_index: consistency,
        }
    }

    #[test]
    fn best_row_scores_one_hundred() {
        let features = vec![
            feature(1, 100.0, 10.0, 1.0, 1.0),
            feature(2, 20.0, 1.0, 0.1, 0.1),
        ];
        let scores = score_engagement(&features);
        assert!((scores[0].score - 100.0).abs() < 1e-9);
        assert!(scores[1].score.abs() < 1e-9);
    }

    #[test]
    fn weights_sum_the_documented_shares() {
        // Row at the max of frequency only; every other column flat.
        let features = vec![
            feature(1, 50.0, 8.0, 0.5, 0.5),
            feature(2, 50.0, 2.0, 0.5, 0.5),
        ];
        let scores = score_engagement(&features);
        assert!((scores[0].score - 40.0).abs() < 1e-9);
        assert!(scores[1].score.abs() < 1e-9);
    }

    #[test]
    fn degenerate_batch_scores_zero() {
        let features = vec![feature(1, 50.0, 3.0, 0.5, 0.5)];
        let scores = score_engagement(&features);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 0.0);
    }

    #[test]
    fn scores_stay_in_range() {
        let features = vec![
            feature(1, 10.0, 1.0, 0.05, 0.0),
            feature(2, 55.0, 4.0, 0.4, 0.3),
            feature(3, 95.0, 12.0, 0.97, 0.9),
        ];
        for s in score_engagement(&features) {
            assert!((0.0..=100.0).contains(&s.score));
        }
    }
}
