use std::collections::{BTreeMap, HashMap};

use crate::error::PipelineError;
use crate::models::{DomainLikelihood, DomainSkillWeight};
use crate::scale;

/// Which likelihood strategy a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Deterministic,
    Model,
}

/// Deterministic weighted-skill likelihoods for one student.
///
/// For each domain: sum(weight * proficiency_fraction) / sum(weight),
/// restricted to skills the student has a known proficiency for. Skills
/// missing from the profile contribute to neither side of the division,
/// so sparse profiles are not penalized. The result is a per-domain
/// fitness in [0,1], not a probability distribution.
///
/// This is the single implementation behind both the student and mentor
/// views; both consume it rather than carrying their own thresholds.
pub fn deterministic_likelihoods(
    student_id: i32,
    skill_proficiency: &HashMap<String, f64>,
    weights: &[DomainSkillWeight],
) -> Result<Vec<DomainLikelihood>, PipelineError> {
    if weights.is_empty() {
        return Err(PipelineError::MissingReferenceData(
            "no domain/skill weight configuration present".to_string(),
        ));
    }

    let mut weighted_sum: BTreeMap<&str, f64> = BTreeMap::new();
    let mut weight_total: BTreeMap<&str, f64> = BTreeMap::new();

    for row in weights {
        let Some(&proficiency) = skill_proficiency.get(&row.skill) else {
            continue;
        };
        *weighted_sum.entry(row.domain.as_str()).or_default() +=
            scale::to_fraction(proficiency) * row.weight;
        *weight_total.entry(row.domain.as_str()).or_default() += row.weight;
    }

    Ok(weighted_sum
        .into_iter()
        .map(|(domain, sum)| {
            let total = weight_total.get(domain).copied().unwrap_or(0.0);
            DomainLikelihood {
                student_id,
                domain: domain.to_string(),
                likelihood_score: if total > 0.0 { sum / total } else { 0.0 },
            }
        })
        .collect())
}

/// Weighted proficiency over one declared goal's skills, reusing the same
/// math as the full likelihood pass. Also returns the proficiency of the
/// goal's top-weighted skill as a fraction (None when the goal has no
/// configured skills).
pub fn goal_focus_score(
    skill_proficiency: &HashMap<String, f64>,
    goal_weights: &[DomainSkillWeight],
) -> (f64, Option<f64>) {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for row in goal_weights {
        let proficiency = skill_proficiency.get(&row.skill).copied().unwrap_or(0.0);
        weighted_sum += scale::to_fraction(proficiency) * row.weight;
        weight_total += row.weight;
    }

    let score = if weight_total > 0.0 { weighted_sum / weight_total } else { 0.0 };
    let top_skill = goal_weights
        .iter()
        .max_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal))
        .map(|row| scale::to_fraction(skill_proficiency.get(&row.skill).copied().unwrap_or(0.0)));
    (score, top_skill)
}

/// Sorts likelihoods best-first. Ties break on domain name so the order
/// is stable across runs.
pub fn rank_descending(mut likelihoods: Vec<DomainLikelihood>) -> Vec<DomainLikelihood> {
    likelihoods.sort_by(|a, b| {
        b.likelihood_score
            .partial_cmp(&a.likelihood_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.domain.cmp(&b.domain))
    });
    likelihoods
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(domain: &str, skill: &str, weight: f64) -> DomainSkillWeight {
        DomainSkillWeight {
            domain: domain.to_string(),
            skill: skill.to_string(),
            weight,
        }
    }

    #[test]
    fn weighted_average_matches_hand_computation() {
        let weights = vec![weight("AI/ML", "Python", 2.0), weight("AI/ML", "Statistics", 1.0)];
        let mut profile = HashMap::new();
        profile.insert("Python".to_string(), 80.0);
        profile.insert("Statistics".to_string(), 40.0);

        let likelihoods = deterministic_likelihoods(7, &profile, &weights).unwrap();
        assert_eq!(likelihoods.len(), 1);
        let rounded = (likelihoods[0].likelihood_score * 1000.0).round() / 1000.0;
        assert_eq!(rounded, 0.667);
    }

    #[test]
    fn unknown_skills_do_not_penalize() {
        let weights = vec![weight("AI/ML", "Python", 2.0), weight("AI/ML", "Statistics", 3.0)];
        let mut profile = HashMap::new();
        profile.insert("Python".to_string(), 80.0);

        let likelihoods = deterministic_likelihoods(7, &profile, &weights).unwrap();
        // Statistics is absent from the profile, so the score is Python's
        // proficiency alone, not dragged down by the missing skill.
        assert!((likelihoods[0].likelihood_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn empty_weight_table_is_a_hard_error() {
        let profile = HashMap::new();
        let result = deterministic_likelihoods(7, &profile, &[]);
        assert!(matches!(result, Err(PipelineError::MissingReferenceData(_))));
    }

    #[test]
    fn domains_without_any_known_skill_produce_no_row() {
        let weights = vec![weight("AI/ML", "Python", 2.0), weight("Web Dev", "CSS", 1.0)];
        let mut profile = HashMap::new();
        profile.insert("Python".to_string(), 60.0);

        let likelihoods = deterministic_likelihoods(7, &profile, &weights).unwrap();
        assert_eq!(likelihoods.len(), 1);
        assert_eq!(likelihoods[0].domain, "AI/ML");
    }

    #[test]
    fn fractional_proficiency_is_accepted() {
        let weights = vec![weight("AI/ML", "Python", 1.0)];
        let mut profile = HashMap::new();
        profile.insert("Python".to_string(), 0.8);
        let likelihoods = deterministic_likelihoods(7, &profile, &weights).unwrap();
        assert!((likelihoods[0].likelihood_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn ranking_is_stable_on_ties() {
        let rows = vec![
            DomainLikelihood { student_id: 1, domain: "B".into(), likelihood_score: 0.5 },
            DomainLikelihood { student_id: 1, domain: "A".into(), likelihood_score: 0.5 },
            DomainLikelihood { student_id: 1, domain: "C".into(), likelihood_score: 0.9 },
        ];
        let ranked = rank_descending(rows);
        assert_eq!(ranked[0].domain, "C");
        assert_eq!(ranked[1].domain, "A");
        assert_eq!(ranked[2].domain, "B");
    }

    #[test]
    fn goal_focus_reuses_weighted_math() {
        let weights = vec![weight("AI/ML", "Python", 2.0), weight("AI/ML", "Statistics", 1.0)];
        let mut profile = HashMap::new();
        profile.insert("Python".to_string(), 80.0);
        profile.insert("Statistics".to_string(), 40.0);
        let (score, top_skill) = goal_focus_score(&profile, &weights);
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
        assert!((top_skill.unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn goal_focus_treats_missing_skills_as_zero() {
        // Unlike the cross-domain pass, a declared goal's missing skills
        // do count against the student.
        let weights = vec![weight("AI/ML", "Python", 1.0), weight("AI/ML", "Statistics", 1.0)];
        let mut profile = HashMap::new();
        profile.insert("Python".to_string(), 100.0);
        let (score, _) = goal_focus_score(&profile, &weights);
        assert!((score - 0.5).abs() < 1e-9);
    }
}
