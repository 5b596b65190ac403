use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One assessment attempt joined to its assessment's domain metadata.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub student_id: i32,
    pub domain: String,
    pub score: f64,
    pub level_attempted: i32,
    pub max_level: i32,
    pub attempt_date: NaiveDate,
}

/// Derived per (student, domain) signals, fully recomputed each run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredFeature {
    pub student_id: i32,
    pub domain: String,
    pub avg_score: f64,
    pub attempt_frequency: f64,
    pub recency_score: f64,
    pub consistency_index: f64,
}

/// One point in the append-only weekly engagement series.
#[derive(Debug, Clone)]
pub struct WeeklyScore {
    pub student_id: i32,
    pub domain: String,
    pub week: NaiveDate,
    pub engagement_score: f64,
}

/// Ordinal behavioral bucket, CONSISTENT > IMPROVING > DROPPING > LOW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cluster {
    Low,
    Dropping,
    Improving,
    Consistent,
}

impl Cluster {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cluster::Low => "LOW",
            Cluster::Dropping => "DROPPING",
            Cluster::Improving => "IMPROVING",
            Cluster::Consistent => "CONSISTENT",
        }
    }

    pub fn parse(value: &str) -> Option<Cluster> {
        match value {
            "LOW" => Some(Cluster::Low),
            "DROPPING" => Some(Cluster::Dropping),
            "IMPROVING" => Some(Cluster::Improving),
            "CONSISTENT" => Some(Cluster::Consistent),
            _ => None,
        }
    }

    /// Ordinal encoding used as a model feature: LOW=0 .. CONSISTENT=3.
    pub fn ordinal(&self) -> f64 {
        match self {
            Cluster::Low => 0.0,
            Cluster::Dropping => 1.0,
            Cluster::Improving => 2.0,
            Cluster::Consistent => 3.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    pub student_id: i32,
    pub domain: String,
    pub cluster: Cluster,
    pub confidence: f64,
    pub last_updated: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct SkillProficiency {
    pub student_id: i32,
    pub skill: String,
    pub proficiency_pct: f64,
}

/// Static configuration relating a domain to one constituent skill.
#[derive(Debug, Clone)]
pub struct DomainSkillWeight {
    pub domain: String,
    pub skill: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainLikelihood {
    pub student_id: i32,
    pub domain: String,
    pub likelihood_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalState {
    Set,
    NotSet,
}

impl GoalState {
    pub fn parse(value: &str) -> GoalState {
        if value == "SET" {
            GoalState::Set
        } else {
            GoalState::NotSet
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub student_id: i32,
    pub name: String,
    pub goal_state: GoalState,
    pub selected_goal: Option<String>,
    pub join_date: NaiveDate,
}

/// Attempt volume/recency stats used by recommendation gating.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptStats {
    pub total_attempts: i64,
    pub last_attempt: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationStatus {
    New,
    NotEngaged,
    Recommended,
    Confused,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::New => "NEW",
            RecommendationStatus::NotEngaged => "NOT_ENGAGED",
            RecommendationStatus::Recommended => "RECOMMENDED",
            RecommendationStatus::Confused => "CONFUSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentorAction {
    None,
    Monitor,
    CheckIn,
    UrgentIntervention,
}

impl MentorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MentorAction::None => "NONE",
            MentorAction::Monitor => "MONITOR",
            MentorAction::CheckIn => "CHECK_IN",
            MentorAction::UrgentIntervention => "URGENT_INTERVENTION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentAction {
    Harder,
    Same,
    Simplify,
    Reset,
}

impl ContentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentAction::Harder => "HARDER",
            ContentAction::Same => "SAME",
            ContentAction::Simplify => "SIMPLIFY",
            ContentAction::Reset => "RESET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeAction {
    None,
    Motivational,
    GoalReminder,
    Escalate,
}

impl NudgeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NudgeAction::None => "NONE",
            NudgeAction::Motivational => "MOTIVATIONAL",
            NudgeAction::GoalReminder => "GOAL_REMINDER",
            NudgeAction::Escalate => "ESCALATE",
        }
    }
}

/// The (mentor, content, nudge) triple produced by the action engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTriple {
    pub mentor: MentorAction,
    pub content: ContentAction,
    pub nudge: NudgeAction,
}

/// Latest decision for a (student, domain); upserted, not a history.
#[derive(Debug, Clone)]
pub struct ActionDecision {
    pub student_id: i32,
    pub domain: String,
    pub mentor_action: Option<MentorAction>,
    pub content_action: ContentAction,
    pub nudge_action: Option<NudgeAction>,
    pub reason: String,
}

/// Row shape consumed by the probabilistic likelihood model: engineered
/// features joined with a proficiency value and a cluster assignment.
#[derive(Debug, Clone)]
pub struct LabeledFeatureRow {
    pub student_id: i32,
    pub domain: String,
    pub avg_score: f64,
    pub attempt_frequency: f64,
    pub recency_score: f64,
    pub consistency_index: f64,
    pub proficiency_pct: f64,
    pub cluster: Cluster,
}

/// Trained classifier plus bookkeeping, stored in model_artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: i32,
    pub trained_rows: usize,
    pub classifier: crate::model::DomainClassifier,
}
