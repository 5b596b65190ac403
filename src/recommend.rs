use crate::models::{DomainLikelihood, RecommendationStatus};

pub const NEW_STUDENT_DAYS: i64 = 7;
pub const MIN_ATTEMPTS_FOR_RECO: i64 = 3;
pub const INACTIVE_DAYS: i64 = 21;
pub const RECOMMENDATION_MIN_SCORE: f64 = 0.35;
pub const RECOMMENDATION_MIN_GAP: f64 = 0.08;

/// Everything gating needs to know about one student. `ranked` must be
/// sorted best-first (see likelihood::rank_descending).
#[derive(Debug, Clone)]
pub struct GatingInput<'a> {
    pub days_since_join: i64,
    pub total_attempts: i64,
    pub days_since_last_attempt: Option<i64>,
    pub ranked: &'a [DomainLikelihood],
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatingOutcome {
    pub status: RecommendationStatus,
    pub top_domain: Option<String>,
}

/// One precedence entry: a named predicate producing an outcome when it
/// fires. Expressing the cascade as data keeps ordering and coverage
/// independently testable.
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&GatingInput) -> Option<GatingOutcome>,
}

/// The ordered rule list, first match wins. The final rule always fires,
/// so classification is total.
static RULES: [Rule; 6] = [
    Rule { name: "new_student", apply: new_student },
    Rule { name: "never_attempted", apply: never_attempted },
    Rule { name: "inactive", apply: inactive },
    Rule { name: "no_likelihoods", apply: no_likelihoods },
    Rule { name: "clear_front_runner", apply: clear_front_runner },
    Rule { name: "undecided", apply: undecided },
];

pub fn rules() -> &'static [Rule] {
    &RULES
}

pub fn classify(input: &GatingInput) -> GatingOutcome {
    for rule in rules() {
        if let Some(outcome) = (rule.apply)(input) {
            return outcome;
        }
    }
    // The undecided rule is unconditional; this is unreachable.
    GatingOutcome { status: RecommendationStatus::Confused, top_domain: None }
}

fn new_student(input: &GatingInput) -> Option<GatingOutcome> {
    if input.days_since_join <= NEW_STUDENT_DAYS && input.total_attempts < MIN_ATTEMPTS_FOR_RECO {
        Some(GatingOutcome { status: RecommendationStatus::New, top_domain: None })
    } else {
        None
    }
}

fn never_attempted(input: &GatingInput) -> Option<GatingOutcome> {
    if input.days_since_last_attempt.is_none() {
        Some(GatingOutcome { status: RecommendationStatus::NotEngaged, top_domain: None })
    } else {
        None
    }
}

fn inactive(input: &GatingInput) -> Option<GatingOutcome> {
    match input.days_since_last_attempt {
        Some(days) if days >= INACTIVE_DAYS => {
            Some(GatingOutcome { status: RecommendationStatus::NotEngaged, top_domain: None })
        }
        _ => None,
    }
}

fn no_likelihoods(input: &GatingInput) -> Option<GatingOutcome> {
    if input.ranked.is_empty() {
        Some(GatingOutcome { status: RecommendationStatus::Confused, top_domain: None })
    } else {
        None
    }
}

fn clear_front_runner(input: &GatingInput) -> Option<GatingOutcome> {
    let top = input.ranked.first()?;
    let second_score = input.ranked.get(1).map(|l| l.likelihood_score).unwrap_or(0.0);
    let gap = top.likelihood_score - second_score;
    if top.likelihood_score >= RECOMMENDATION_MIN_SCORE && gap >= RECOMMENDATION_MIN_GAP {
        Some(GatingOutcome {
            status: RecommendationStatus::Recommended,
            top_domain: Some(top.domain.clone()),
        })
    } else {
        None
    }
}

fn undecided(input: &GatingInput) -> Option<GatingOutcome> {
    // Even without a recommendation the top candidate is surfaced so a
    // mentor can inspect the likely pathway.
    Some(GatingOutcome {
        status: RecommendationStatus::Confused,
        top_domain: input.ranked.first().map(|l| l.domain.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn likelihood(domain: &str, score: f64) -> DomainLikelihood {
        DomainLikelihood {
            student_id: 1,
            domain: domain.to_string(),
            likelihood_score: score,
        }
    }

    fn input<'a>(
        days_since_join: i64,
        total_attempts: i64,
        days_since_last_attempt: Option<i64>,
        ranked: &'a [DomainLikelihood],
    ) -> GatingInput<'a> {
        GatingInput { days_since_join, total_attempts, days_since_last_attempt, ranked }
    }

    #[test]
    fn fresh_student_is_new_regardless_of_likelihoods() {
        let ranked = vec![likelihood("AI/ML", 0.9), likelihood("Web Dev", 0.1)];
        let outcome = classify(&input(3, 1, Some(1), &ranked));
        assert_eq!(outcome.status, RecommendationStatus::New);
        assert_eq!(outcome.top_domain, None);
    }

    #[test]
    fn stale_student_is_not_engaged_even_with_strong_top() {
        let ranked = vec![likelihood("AI/ML", 0.9), likelihood("Web Dev", 0.1)];
        let outcome = classify(&input(200, 15, Some(25), &ranked));
        assert_eq!(outcome.status, RecommendationStatus::NotEngaged);
    }

    #[test]
    fn zero_attempts_is_not_engaged() {
        let outcome = classify(&input(60, 0, None, &[]));
        assert_eq!(outcome.status, RecommendationStatus::NotEngaged);
    }

    #[test]
    fn no_likelihood_rows_is_confused_without_domain() {
        let outcome = classify(&input(60, 10, Some(2), &[]));
        assert_eq!(outcome.status, RecommendationStatus::Confused);
        assert_eq!(outcome.top_domain, None);
    }

    #[test]
    fn clear_front_runner_is_recommended() {
        let ranked = vec![likelihood("AI/ML", 0.5), likelihood("Web Dev", 0.3)];
        let outcome = classify(&input(60, 10, Some(2), &ranked));
        assert_eq!(outcome.status, RecommendationStatus::Recommended);
        assert_eq!(outcome.top_domain.as_deref(), Some("AI/ML"));
    }

    #[test]
    fn close_race_is_confused_but_surfaces_top() {
        let ranked = vec![likelihood("AI/ML", 0.40), likelihood("Web Dev", 0.38)];
        let outcome = classify(&input(60, 10, Some(2), &ranked));
        assert_eq!(outcome.status, RecommendationStatus::Confused);
        assert_eq!(outcome.top_domain.as_deref(), Some("AI/ML"));
    }

    #[test]
    fn weak_top_is_confused_even_with_wide_gap() {
        let ranked = vec![likelihood("AI/ML", 0.30), likelihood("Web Dev", 0.05)];
        let outcome = classify(&input(60, 10, Some(2), &ranked));
        assert_eq!(outcome.status, RecommendationStatus::Confused);
    }

    #[test]
    fn single_likelihood_compares_against_zero() {
        let ranked = vec![likelihood("AI/ML", 0.36)];
        let outcome = classify(&input(60, 10, Some(2), &ranked));
        assert_eq!(outcome.status, RecommendationStatus::Recommended);
    }

    #[test]
    fn new_requires_both_recency_and_low_volume() {
        let ranked = vec![likelihood("AI/ML", 0.5), likelihood("Web Dev", 0.1)];
        // Joined recently but already active: not NEW.
        let outcome = classify(&input(3, 5, Some(1), &ranked));
        assert_eq!(outcome.status, RecommendationStatus::Recommended);
    }

    #[test]
    fn rule_list_is_total() {
        // The last rule is unconditional, so every input matches a rule.
        let ranked = vec![likelihood("AI/ML", 0.2)];
        let inputs = [
            input(3, 0, None, &ranked),
            input(100, 50, Some(0), &ranked),
            input(100, 50, Some(20), &[]),
            input(8, 2, Some(22), &ranked),
        ];
        for case in &inputs {
            let fired = rules().iter().filter_map(|r| (r.apply)(case)).count();
            assert!(fired >= 1);
        }
    }

    #[test]
    fn precedence_is_the_documented_order() {
        let names: Vec<&str> = rules().iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "new_student",
                "never_attempted",
                "inactive",
                "no_likelihoods",
                "clear_front_runner",
                "undecided"
            ]
        );
    }
}
