use crate::models::{ActionTriple, Cluster, ContentAction, MentorAction, NudgeAction};

/// Action triple for a student with a declared goal, keyed by cluster.
/// Total over the four clusters.
pub fn goal_set_actions(cluster: Cluster) -> ActionTriple {
    match cluster {
        Cluster::Consistent => ActionTriple {
            mentor: MentorAction::None,
            content: ContentAction::Harder,
            nudge: NudgeAction::None,
        },
        Cluster::Improving => ActionTriple {
            mentor: MentorAction::Monitor,
            content: ContentAction::Same,
            nudge: NudgeAction::Motivational,
        },
        Cluster::Dropping => ActionTriple {
            mentor: MentorAction::CheckIn,
            content: ContentAction::Simplify,
            nudge: NudgeAction::GoalReminder,
        },
        Cluster::Low => ActionTriple {
            mentor: MentorAction::UrgentIntervention,
            content: ContentAction::Reset,
            nudge: NudgeAction::Escalate,
        },
    }
}

/// Action triple for a student without a declared goal, keyed by their
/// likelihood band. Total over [0,1] (and anything outside it).
pub fn goal_not_set_actions(likelihood: f64) -> ActionTriple {
    if likelihood >= 0.75 {
        ActionTriple {
            mentor: MentorAction::Monitor,
            content: ContentAction::Same,
            nudge: NudgeAction::GoalReminder,
        }
    } else if likelihood >= 0.5 {
        ActionTriple {
            mentor: MentorAction::CheckIn,
            content: ContentAction::Simplify,
            nudge: NudgeAction::Motivational,
        }
    } else {
        ActionTriple {
            mentor: MentorAction::UrgentIntervention,
            content: ContentAction::Reset,
            nudge: NudgeAction::Escalate,
        }
    }
}

/// Content-only decision used where goal state is irrelevant, with its
/// fixed display reason.
pub fn content_decision(cluster: Cluster) -> (ContentAction, &'static str) {
    match cluster {
        Cluster::Consistent => (ContentAction::Harder, "High engagement detected"),
        Cluster::Improving => (ContentAction::Same, "Positive trend"),
        Cluster::Dropping => (ContentAction::Simplify, "Engagement declining"),
        Cluster::Low => (ContentAction::Reset, "Low engagement"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTERS: [Cluster; 4] =
        [Cluster::Low, Cluster::Dropping, Cluster::Improving, Cluster::Consistent];

    #[test]
    fn goal_set_table_matches_the_mapping() {
        let triple = goal_set_actions(Cluster::Dropping);
        assert_eq!(triple.mentor, MentorAction::CheckIn);
        assert_eq!(triple.content, ContentAction::Simplify);
        assert_eq!(triple.nudge, NudgeAction::GoalReminder);

        let triple = goal_set_actions(Cluster::Consistent);
        assert_eq!(triple.mentor, MentorAction::None);
        assert_eq!(triple.content, ContentAction::Harder);
        assert_eq!(triple.nudge, NudgeAction::None);
    }

    #[test]
    fn likelihood_bands_are_total_and_ordered() {
        let high = goal_not_set_actions(0.75);
        assert_eq!(high.mentor, MentorAction::Monitor);
        assert_eq!(high.nudge, NudgeAction::GoalReminder);

        let mid = goal_not_set_actions(0.5);
        assert_eq!(mid.mentor, MentorAction::CheckIn);
        let just_below_high = goal_not_set_actions(0.7499);
        assert_eq!(just_below_high.mentor, MentorAction::CheckIn);

        let low = goal_not_set_actions(0.49);
        assert_eq!(low.mentor, MentorAction::UrgentIntervention);
        assert_eq!(low.content, ContentAction::Reset);
    }

    #[test]
    fn every_cluster_and_band_is_covered() {
        for cluster in CLUSTERS {
            // Total functions: calling them is the coverage proof, the
            // match has no wildcard arm for clusters.
            let _ = goal_set_actions(cluster);
            let _ = content_decision(cluster);
        }
        for step in 0..=100 {
            let _ = goal_not_set_actions(step as f64 / 100.0);
        }
    }

    #[test]
    fn content_reasons_are_fixed_strings() {
        assert_eq!(content_decision(Cluster::Consistent), (ContentAction::Harder, "High engagement detected"));
        assert_eq!(content_decision(Cluster::Improving), (ContentAction::Same, "Positive trend"));
        assert_eq!(content_decision(Cluster::Dropping), (ContentAction::Simplify, "Engagement declining"));
        assert_eq!(content_decision(Cluster::Low), (ContentAction::Reset, "Low engagement"));
    }
}
