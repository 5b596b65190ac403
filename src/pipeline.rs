use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, Weekday};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::clustering::{self, ClusterInput};
use crate::db;
use crate::error::PipelineError;
use crate::likelihood::{self, Strategy};
use crate::model::DomainClassifier;
use crate::models::{
    ActionDecision, DomainLikelihood, GoalState, ModelArtifact, WeeklyScore,
};
use crate::scale;
use crate::transition;
use crate::{actions, recommend, scoring};

/// Outcome of one batch stage. Skipped units are the soft
/// insufficient-data cases; they are reported, never raised.
#[derive(Debug, Clone, Copy)]
pub struct StageSummary {
    pub stage: &'static str,
    pub written: usize,
    pub skipped: usize,
}

impl std::fmt::Display for StageSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} rows written, {} units skipped",
            self.stage, self.written, self.skipped
        )
    }
}

/// Default engagement score for students with no weekly history yet,
/// on the 0-100 scale.
const DEFAULT_ENGAGEMENT: f64 = 50.0;

fn week_start(date: NaiveDate) -> NaiveDate {
    date.week(Weekday::Mon).first_day()
}

/// Stage 1: recompute engineered features from the full attempt history.
pub async fn run_features(pool: &PgPool, today: NaiveDate) -> anyhow::Result<StageSummary> {
    let attempts = db::fetch_attempts(pool).await?;
    let groups: BTreeSet<(i32, &str)> = attempts
        .iter()
        .map(|a| (a.student_id, a.domain.as_str()))
        .collect();

    let features = crate::features::engineer_features(&attempts, today);
    let skipped = groups.len() - features.len();
    db::replace_features(pool, &features).await?;

    let summary = StageSummary { stage: "features", written: features.len(), skipped };
    info!(written = summary.written, skipped = summary.skipped, "feature engineering complete");
    Ok(summary)
}

/// Stage 2: score engagement and append this week's series point.
pub async fn run_scoring(pool: &PgPool, today: NaiveDate) -> anyhow::Result<StageSummary> {
    let features = db::fetch_features(pool).await?;
    let scores = scoring::score_engagement(&features);
    let week = week_start(today);

    let weekly: Vec<WeeklyScore> = scores
        .iter()
        .map(|s| WeeklyScore {
            student_id: s.student_id,
            domain: s.domain.clone(),
            week,
            engagement_score: s.score,
        })
        .collect();
    db::upsert_weekly_scores(pool, &weekly).await?;

    let summary = StageSummary { stage: "scoring", written: weekly.len(), skipped: 0 };
    info!(written = summary.written, week = %week, "engagement scoring complete");
    Ok(summary)
}

/// Stage 3: cluster each domain's population into the four buckets.
pub async fn run_clustering(pool: &PgPool, today: NaiveDate) -> anyhow::Result<StageSummary> {
    let features = db::fetch_features(pool).await?;
    let weekly = db::fetch_weekly_scores(pool).await?;

    // Latest weekly point per (student, domain); rows are week-ordered.
    let mut latest: HashMap<(i32, &str), f64> = HashMap::new();
    for w in &weekly {
        latest.insert((w.student_id, w.domain.as_str()), w.engagement_score);
    }

    let inputs: Vec<ClusterInput> = features
        .iter()
        .map(|f| ClusterInput {
            student_id: f.student_id,
            domain: f.domain.clone(),
            avg_score: f.avg_score,
            attempt_frequency: f.attempt_frequency,
            recency_score: f.recency_score,
            consistency_index: f.consistency_index,
            engagement_score: latest
                .get(&(f.student_id, f.domain.as_str()))
                .copied()
                .unwrap_or(DEFAULT_ENGAGEMENT),
        })
        .collect();

    let (assignments, skipped) = clustering::cluster_all(&inputs, today);
    db::upsert_clusters(pool, &assignments).await?;

    let summary = StageSummary { stage: "clustering", written: assignments.len(), skipped };
    info!(written = summary.written, skipped_domains = skipped, "clustering complete");
    Ok(summary)
}

/// Stage 4: apply the trend FSM to existing cluster labels.
pub async fn run_transitions(pool: &PgPool, today: NaiveDate) -> anyhow::Result<StageSummary> {
    let clusters = db::fetch_clusters(pool).await?;
    let weekly = db::fetch_weekly_scores(pool).await?;

    let mut history: HashMap<(i32, &str), Vec<f64>> = HashMap::new();
    for w in &weekly {
        history
            .entry((w.student_id, w.domain.as_str()))
            .or_default()
            .push(w.engagement_score);
    }

    let mut written = 0usize;
    let mut skipped = 0usize;
    for assignment in &clusters {
        let Some(scores) = history.get(&(assignment.student_id, assignment.domain.as_str())) else {
            skipped += 1;
            continue;
        };
        if scores.len() < transition::MIN_HISTORY_POINTS {
            skipped += 1;
            continue;
        }
        if let Some(next) = transition::evaluate(assignment.cluster, scores) {
            db::update_cluster_label(pool, assignment.student_id, &assignment.domain, next, today)
                .await?;
            info!(
                student_id = assignment.student_id,
                domain = %assignment.domain,
                from = assignment.cluster.as_str(),
                to = next.as_str(),
                "cluster transition"
            );
            written += 1;
        }
    }

    let summary = StageSummary { stage: "transitions", written, skipped };
    info!(written, skipped, "cluster transitions complete");
    Ok(summary)
}

/// Trains the probabilistic likelihood model and stores it as the next
/// artifact version.
pub async fn run_training(pool: &PgPool) -> anyhow::Result<StageSummary> {
    let rows = db::fetch_labeled_rows(pool).await?;
    let classifier = DomainClassifier::train(&rows)?;
    let version = db::next_model_version(pool).await?;
    let artifact = ModelArtifact { version, trained_rows: rows.len(), classifier };
    db::save_model_artifact(pool, &artifact).await?;

    info!(version, rows = rows.len(), "likelihood model trained");
    Ok(StageSummary { stage: "train-model", written: 1, skipped: 0 })
}

/// Stage 5: domain likelihoods for students without a declared goal.
///
/// The scope is one student or every goal-not-set student; either way the
/// student's prior rows are fully replaced. The model strategy requires a
/// trained artifact; with `fallback` it degrades to the deterministic
/// strategy instead of failing.
pub async fn run_likelihood(
    pool: &PgPool,
    strategy: Strategy,
    student: Option<i32>,
    fallback: bool,
) -> anyhow::Result<StageSummary> {
    match strategy {
        Strategy::Deterministic => run_likelihood_deterministic(pool, student).await,
        Strategy::Model => match db::load_latest_model(pool).await? {
            Some(artifact) => run_likelihood_model(pool, &artifact, student).await,
            None if fallback => {
                warn!("no trained model artifact; falling back to deterministic strategy");
                run_likelihood_deterministic(pool, student).await
            }
            None => Err(PipelineError::ModelUnavailable(
                "no trained artifact; run train-model first or use the deterministic strategy"
                    .to_string(),
            )
            .into()),
        },
    }
}

async fn run_likelihood_deterministic(
    pool: &PgPool,
    student: Option<i32>,
) -> anyhow::Result<StageSummary> {
    let weights = db::fetch_skill_weights(pool).await?;
    if weights.is_empty() {
        return Err(PipelineError::MissingReferenceData(
            "no domain/skill weight configuration present".to_string(),
        )
        .into());
    }

    let students = db::fetch_students(pool).await?;
    let mut written = 0usize;
    let mut skipped = 0usize;

    for s in &students {
        if let Some(only) = student {
            if s.student_id != only {
                continue;
            }
        } else if s.goal_state == GoalState::Set {
            continue;
        }

        let profile = db::fetch_skill_profile(pool, s.student_id).await?;
        let likelihoods = if profile.is_empty() {
            // No skill profile: fall back to domain-level attempt
            // averages as the proficiency signal.
            let averages = db::fetch_attempt_averages(pool, s.student_id).await?;
            averages
                .into_iter()
                .map(|(domain, avg)| DomainLikelihood {
                    student_id: s.student_id,
                    domain,
                    likelihood_score: scale::to_fraction(avg),
                })
                .collect()
        } else {
            likelihood::deterministic_likelihoods(s.student_id, &profile, &weights)?
        };

        if likelihoods.is_empty() {
            skipped += 1;
            continue;
        }
        written += likelihoods.len();
        db::replace_likelihoods(pool, Some(s.student_id), &likelihoods).await?;
    }

    let summary = StageSummary { stage: "likelihood", written, skipped };
    info!(written, skipped, "deterministic likelihoods computed");
    Ok(summary)
}

async fn run_likelihood_model(
    pool: &PgPool,
    artifact: &ModelArtifact,
    student: Option<i32>,
) -> anyhow::Result<StageSummary> {
    let rows = db::fetch_labeled_rows(pool).await?;
    let mut by_student: BTreeMap<i32, Vec<_>> = BTreeMap::new();
    for row in rows {
        if let Some(only) = student {
            if row.student_id != only {
                continue;
            }
        }
        by_student.entry(row.student_id).or_default().push(row);
    }

    let mut written = 0usize;
    let mut skipped = 0usize;
    for (student_id, student_rows) in &by_student {
        match artifact.classifier.predict_student(student_rows) {
            Ok(likelihoods) => {
                written += likelihoods.len();
                db::replace_likelihoods(pool, Some(*student_id), &likelihoods).await?;
            }
            Err(err) => {
                warn!(student_id, %err, "skipping student without predictable rows");
                skipped += 1;
            }
        }
    }

    let summary = StageSummary { stage: "likelihood", written, skipped };
    info!(written, skipped, version = artifact.version, "model likelihoods computed");
    Ok(summary)
}

/// Stage 6: map every cluster row to an action decision.
pub async fn run_actions(pool: &PgPool) -> anyhow::Result<StageSummary> {
    let students = db::fetch_students(pool).await?;
    let clusters = db::fetch_clusters(pool).await?;

    let goal_state: HashMap<i32, GoalState> =
        students.iter().map(|s| (s.student_id, s.goal_state)).collect();

    let mut decisions = Vec::new();
    for assignment in &clusters {
        let state = goal_state
            .get(&assignment.student_id)
            .copied()
            .unwrap_or(GoalState::NotSet);
        let (content, reason) = actions::content_decision(assignment.cluster);

        let triple = match state {
            GoalState::Set => actions::goal_set_actions(assignment.cluster),
            GoalState::NotSet => {
                let likelihoods = db::fetch_likelihoods(pool, assignment.student_id).await?;
                let score = likelihoods
                    .iter()
                    .find(|l| l.domain == assignment.domain)
                    .map(|l| l.likelihood_score)
                    .unwrap_or(0.0);
                actions::goal_not_set_actions(score)
            }
        };

        decisions.push(ActionDecision {
            student_id: assignment.student_id,
            domain: assignment.domain.clone(),
            mentor_action: Some(triple.mentor),
            content_action: content,
            nudge_action: Some(triple.nudge),
            reason: reason.to_string(),
        });
    }

    db::upsert_actions(pool, &decisions).await?;
    let summary = StageSummary { stage: "actions", written: decisions.len(), skipped: 0 };
    info!(written = summary.written, "action decisions generated");
    Ok(summary)
}

/// Recommendation gating for one student, over freshly ranked
/// likelihoods. Shared by the CLI and the report.
pub async fn classify_student(
    pool: &PgPool,
    student: &crate::models::StudentRecord,
    today: NaiveDate,
) -> anyhow::Result<(recommend::GatingOutcome, Vec<DomainLikelihood>)> {
    let stats = db::fetch_attempt_stats(pool, student.student_id).await?;
    let ranked = likelihood::rank_descending(db::fetch_likelihoods(pool, student.student_id).await?);

    let input = recommend::GatingInput {
        days_since_join: (today - student.join_date).num_days(),
        total_attempts: stats.total_attempts,
        days_since_last_attempt: stats.last_attempt.map(|d| (today - d).num_days()),
        ranked: &ranked,
    };
    Ok((recommend::classify(&input), ranked))
}

/// The full batch: each stage persists before the next reads, so a
/// failure leaves earlier stages' output intact and a retry can resume
/// from the failed stage.
pub async fn run_all(pool: &PgPool, today: NaiveDate) -> anyhow::Result<Vec<StageSummary>> {
    let mut summaries = Vec::new();
    summaries.push(run_features(pool, today).await?);
    summaries.push(run_scoring(pool, today).await?);
    summaries.push(run_clustering(pool, today).await?);
    summaries.push(run_transitions(pool, today).await?);
    summaries.push(run_likelihood(pool, Strategy::Deterministic, None, false).await?);
    summaries.push(run_actions(pool).await?);
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_start_is_monday() {
        let thursday = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(week_start(thursday), monday);
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn stage_summary_reads_plainly() {
        let summary = StageSummary { stage: "clustering", written: 8, skipped: 1 };
        assert_eq!(summary.to_string(), "clustering: 8 rows written, 1 units skipped");
    }
}
