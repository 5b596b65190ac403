use std::fmt::Write;

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::likelihood;
use crate::models::{Cluster, DomainLikelihood, GoalState, RecommendationStatus};
use crate::{db, pipeline};

const FOCUS_SKILL_MIN: f64 = 0.4;

/// Band mapping used for display when no clustered label exists for the
/// aggregate view: a fractional score collapsed to the ordinal buckets.
pub fn score_to_cluster(score: f64) -> Cluster {
    if score >= 0.7 {
        Cluster::Consistent
    } else if score >= 0.55 {
        Cluster::Improving
    } else if score >= 0.4 {
        Cluster::Dropping
    } else {
        Cluster::Low
    }
}

pub struct GoalSetEntry {
    pub name: String,
    pub goal: String,
    pub focus_score: f64,
    pub overall: Cluster,
}

pub struct ProspectEntry {
    pub name: String,
    pub status: RecommendationStatus,
    pub top_domain: Option<String>,
    pub predicted: Vec<DomainLikelihood>,
}

pub struct ClusterEntry {
    pub name: String,
    pub domain: String,
    pub cluster: Cluster,
    pub confidence: f64,
}

/// Overall display cluster for a goal-set student: band on the focus
/// score, demoted to LOW when the goal's top-weighted skill is weak.
pub fn goal_overall_cluster(focus_score: f64, top_skill: Option<f64>) -> Cluster {
    let banded = score_to_cluster(focus_score);
    match top_skill {
        Some(proficiency) if proficiency < FOCUS_SKILL_MIN => Cluster::Low,
        _ => banded,
    }
}

pub async fn gather_and_build(pool: &PgPool, today: NaiveDate) -> anyhow::Result<String> {
    let students = db::fetch_students(pool).await?;
    let weights = db::fetch_skill_weights(pool).await?;
    let clusters = db::fetch_clusters(pool).await?;

    let mut goal_set = Vec::new();
    let mut prospects = Vec::new();

    for student in &students {
        match student.goal_state {
            GoalState::Set => {
                let goal = student.selected_goal.clone().unwrap_or_else(|| "Unknown".to_string());
                let profile = db::fetch_skill_profile(pool, student.student_id).await?;
                let goal_weights: Vec<_> =
                    weights.iter().filter(|w| w.domain == goal).cloned().collect();
                let (focus_score, top_skill) =
                    likelihood::goal_focus_score(&profile, &goal_weights);
                goal_set.push(GoalSetEntry {
                    name: student.name.clone(),
                    goal,
                    focus_score,
                    overall: goal_overall_cluster(focus_score, top_skill),
                });
            }
            GoalState::NotSet => {
                let (outcome, ranked) = pipeline::classify_student(pool, student, today).await?;
                prospects.push(ProspectEntry {
                    name: student.name.clone(),
                    status: outcome.status,
                    top_domain: outcome.top_domain,
                    predicted: ranked.into_iter().take(3).collect(),
                });
            }
        }
    }

    let names: std::collections::HashMap<i32, &str> =
        students.iter().map(|s| (s.student_id, s.name.as_str())).collect();
    let cluster_entries: Vec<ClusterEntry> = clusters
        .iter()
        .map(|c| ClusterEntry {
            name: names.get(&c.student_id).unwrap_or(&"unknown").to_string(),
            domain: c.domain.clone(),
            cluster: c.cluster,
            confidence: c.confidence,
        })
        .collect();

    Ok(build_report(today, &goal_set, &prospects, &cluster_entries))
}

pub fn build_report(
    today: NaiveDate,
    goal_set: &[GoalSetEntry],
    prospects: &[ProspectEntry],
    clusters: &[ClusterEntry],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Engagement & Recommendation Report");
    let _ = writeln!(output, "Generated {today}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Students with a declared goal");

    if goal_set.is_empty() {
        let _ = writeln!(output, "No students have declared a goal.");
    } else {
        for entry in goal_set {
            let _ = writeln!(
                output,
                "- {} ({}): focus score {:.2}, overall {}",
                entry.name,
                entry.goal,
                entry.focus_score,
                entry.overall.as_str()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students without a goal");

    if prospects.is_empty() {
        let _ = writeln!(output, "No undeclared students.");
    } else {
        for entry in prospects {
            let domains: Vec<String> = entry
                .predicted
                .iter()
                .map(|l| format!("{} {:.2}", l.domain, l.likelihood_score))
                .collect();
            let pathway = entry.top_domain.as_deref().unwrap_or("-");
            let _ = writeln!(
                output,
                "- {} [{}] pathway {}; predicted: {}",
                entry.name,
                entry.status.as_str(),
                pathway,
                if domains.is_empty() { "none".to_string() } else { domains.join(", ") }
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cluster assignments");

    if clusters.is_empty() {
        let _ = writeln!(output, "No cluster assignments yet.");
    } else {
        for entry in clusters {
            let _ = writeln!(
                output,
                "- {} / {}: {} (confidence {:.2})",
                entry.name,
                entry.domain,
                entry.cluster.as_str(),
                entry.confidence
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_cover_the_unit_interval() {
        assert_eq!(score_to_cluster(0.95), Cluster::Consistent);
        assert_eq!(score_to_cluster(0.7), Cluster::Consistent);
        assert_eq!(score_to_cluster(0.69), Cluster::Improving);
        assert_eq!(score_to_cluster(0.55), Cluster::Improving);
        assert_eq!(score_to_cluster(0.54), Cluster::Dropping);
        assert_eq!(score_to_cluster(0.4), Cluster::Dropping);
        assert_eq!(score_to_cluster(0.39), Cluster::Low);
        assert_eq!(score_to_cluster(0.0), Cluster::Low);
    }

    #[test]
    fn weak_top_skill_demotes_to_low() {
        assert_eq!(goal_overall_cluster(0.8, Some(0.3)), Cluster::Low);
        assert_eq!(goal_overall_cluster(0.8, Some(0.9)), Cluster::Consistent);
        assert_eq!(goal_overall_cluster(0.8, None), Cluster::Consistent);
    }

    #[test]
    fn report_lists_every_section() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let goal_set = vec![GoalSetEntry {
            name: "Jules Moreno".to_string(),
            goal: "AI/ML".to_string(),
            focus_score: 0.72,
            overall: Cluster::Consistent,
        }];
        let prospects = vec![ProspectEntry {
            name: "Avery Lee".to_string(),
            status: RecommendationStatus::Recommended,
            top_domain: Some("Web Dev".to_string()),
            predicted: vec![DomainLikelihood {
                student_id: 1,
                domain: "Web Dev".to_string(),
                likelihood_score: 0.61,
            }],
        }];
        let clusters = vec![ClusterEntry {
            name: "Avery Lee".to_string(),
            domain: "Web Dev".to_string(),
            cluster: Cluster::Improving,
            confidence: 0.88,
        }];

        let report = build_report(today, &goal_set, &prospects, &clusters);
        assert!(report.contains("# Engagement & Recommendation Report"));
        assert!(report.contains("Jules Moreno (AI/ML): focus score 0.72, overall CONSISTENT"));
        assert!(report.contains("Avery Lee [RECOMMENDED] pathway Web Dev"));
        assert!(report.contains("Avery Lee / Web Dev: IMPROVING (confidence 0.88)"));
    }

    #[test]
    fn empty_sections_say_so() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let report = build_report(today, &[], &[], &[]);
        assert!(report.contains("No students have declared a goal."));
        assert!(report.contains("No undeclared students."));
        assert!(report.contains("No cluster assignments yet."));
    }
}
