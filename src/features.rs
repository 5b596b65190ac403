use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{AttemptRecord, EngineeredFeature};

/// Derives per (student, domain) engagement signals from raw attempts.
///
/// Groups where the student's highest attempted level has reached the
/// domain's max level are excluded: mastered domains carry no engagement
/// signal and would distort clustering. Returns the features sorted by
/// (student_id, domain) so recomputation over the same attempts is
/// byte-identical.
pub fn engineer_features(attempts: &[AttemptRecord], today: NaiveDate) -> Vec<EngineeredFeature> {
    let mut groups: BTreeMap<(i32, &str), Vec<&AttemptRecord>> = BTreeMap::new();
    for attempt in attempts {
        groups
            .entry((attempt.student_id, attempt.domain.as_str()))
            .or_default()
            .push(attempt);
    }

    let mut features = Vec::new();
    for ((student_id, domain), group) in groups {
        let max_level = group.iter().map(|a| a.max_level).max().unwrap_or(0);
        let max_attempted = group.iter().map(|a| a.level_attempted).max().unwrap_or(0);
        if max_attempted >= max_level {
            continue;
        }

        let avg_score = group.iter().map(|a| a.score).sum::<f64>() / group.len() as f64;
        let mut dates: Vec<NaiveDate> = group.iter().map(|a| a.attempt_date).collect();
        dates.sort();
        let Some(&last_attempt) = dates.last() else {
            continue;
        };

        features.push(EngineeredFeature {
            student_id,
            domain: domain.to_string(),
            avg_score: round_to(avg_score, 2),
            attempt_frequency: round_to(group.len() as f64, 2),
            recency_score: round_to(recency_score(last_attempt, today), 4),
            consistency_index: round_to(consistency_index(&dates), 4),
        });
    }

    features
}

/// exp(-days/30): 1.0 for an attempt today, decaying toward 0 with age.
pub fn recency_score(last_attempt: NaiveDate, today: NaiveDate) -> f64 {
    let days = (today - last_attempt).num_days().max(0) as f64;
    (-days / 30.0).exp()
}

/// 1 / (1 + stddev of day gaps between consecutive attempts); 0 when
/// fewer than two attempt dates exist. Larger means a steadier cadence.
pub fn consistency_index(sorted_dates: &[NaiveDate]) -> f64 {
    if sorted_dates.len() < 2 {
        return 0.0;
    }
    let gaps: Vec<f64> = sorted_dates
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_days() as f64)
        .collect();
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    1.0 / (1.0 + variance.sqrt())
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
