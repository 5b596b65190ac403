use std::collections::HashMap;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::models::{
    ActionDecision, AttemptRecord, AttemptStats, Cluster, ClusterAssignment, DomainLikelihood,
    DomainSkillWeight, EngineeredFeature, GoalState, LabeledFeatureRow, ModelArtifact,
    StudentRecord, WeeklyScore,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let domains = vec![(1, "AI/ML", 5), (2, "Web Dev", 5), (3, "Data Engineering", 4)];
    for (id, name, max_level) in domains {
        sqlx::query(
            r#"
            INSERT INTO engage.domains (domain_id, name, max_level)
            VALUES ($1, $2, $3)
            ON CONFLICT (domain_id) DO UPDATE
            SET name = EXCLUDED.name, max_level = EXCLUDED.max_level
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(max_level)
        .execute(pool)
        .await?;
    }

    let skills = vec![
        (1, "Python"),
        (2, "Statistics"),
        (3, "JavaScript"),
        (4, "CSS"),
        (5, "SQL"),
    ];
    for (id, name) in skills {
        sqlx::query(
            r#"
            INSERT INTO engage.skills (skill_id, name)
            VALUES ($1, $2)
            ON CONFLICT (skill_id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let weights = vec![
        (1, 1, 2.0),
        (1, 2, 1.0),
        (2, 3, 2.0),
        (2, 4, 1.0),
        (3, 1, 1.0),
        (3, 5, 2.0),
    ];
    for (domain_id, skill_id, weight) in weights {
        sqlx::query(
            r#"
            INSERT INTO engage.domain_skill_weights (domain_id, skill_id, weight)
            VALUES ($1, $2, $3)
            ON CONFLICT (domain_id, skill_id) DO UPDATE SET weight = EXCLUDED.weight
            "#,
        )
        .bind(domain_id)
        .bind(skill_id)
        .bind(weight)
        .execute(pool)
        .await?;
    }

    let students = vec![
        (1, "Avery Lee", "NOT_SET", None::<&str>, "2026-01-05"),
        (2, "Jules Moreno", "SET", Some("AI/ML"), "2025-11-20"),
        (3, "Kiara Patel", "NOT_SET", None, "2026-02-01"),
        (4, "Sam Okafor", "NOT_SET", None, "2025-12-12"),
        (5, "Noa Fischer", "NOT_SET", None, "2026-01-18"),
    ];
    for (id, name, goal_state, selected_goal, join_date) in students {
        let join_date: NaiveDate = join_date.parse().context("invalid seed join date")?;
        sqlx::query(
            r#"
            INSERT INTO engage.students (student_id, name, goal_state, selected_goal, join_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id) DO UPDATE
            SET name = EXCLUDED.name, goal_state = EXCLUDED.goal_state,
                selected_goal = EXCLUDED.selected_goal, join_date = EXCLUDED.join_date
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(goal_state)
        .bind(selected_goal)
        .bind(join_date)
        .execute(pool)
        .await?;
    }

    let assessments = vec![(1, "AI/ML", 5, 100.0), (2, "Web Dev", 5, 100.0), (3, "Data Engineering", 4, 100.0)];
    for (id, domain, max_level, max_score) in assessments {
        sqlx::query(
            r#"
            INSERT INTO engage.assessments (assessment_id, domain, max_level, max_score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (assessment_id) DO UPDATE
            SET domain = EXCLUDED.domain, max_level = EXCLUDED.max_level,
                max_score = EXCLUDED.max_score
            "#,
        )
        .bind(id)
        .bind(domain)
        .bind(max_level)
        .bind(max_score)
        .execute(pool)
        .await?;
    }

    let attempts = vec![
        (1, 1, 62.0, 1, "2026-02-02", "PASS"),
        (1, 1, 71.0, 2, "2026-02-09", "PASS"),
        (1, 1, 68.0, 2, "2026-02-16", "PASS"),
        (2, 1, 88.0, 3, "2026-02-10", "PASS"),
        (2, 1, 91.0, 3, "2026-02-17", "PASS"),
        (3, 2, 45.0, 1, "2026-02-05", "FAIL"),
        (4, 1, 52.0, 1, "2026-01-20", "FAIL"),
        (4, 1, 58.0, 1, "2026-02-03", "PASS"),
        (5, 3, 74.0, 2, "2026-02-12", "PASS"),
    ];
    for (student_id, assessment_id, score, level, attempt_date, pass_fail) in attempts {
        let attempt_date: NaiveDate = attempt_date.parse().context("invalid seed attempt date")?;
        sqlx::query(
            r#"
            INSERT INTO engage.assessment_attempts
            (student_id, assessment_id, score, level_attempted, attempt_date, pass_fail)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(student_id)
        .bind(assessment_id)
        .bind(score)
        .bind(level)
        .bind(attempt_date)
        .bind(pass_fail)
        .execute(pool)
        .await?;
    }

    let profiles = vec![
        (1, "Python", 68.0),
        (1, "Statistics", 55.0),
        (2, "Python", 88.0),
        (2, "Statistics", 79.0),
        (3, "JavaScript", 48.0),
        (4, "Python", 54.0),
        (5, "SQL", 72.0),
        (5, "Python", 61.0),
    ];
    for (student_id, skill, proficiency) in profiles {
        sqlx::query(
            r#"
            INSERT INTO engage.skill_profiles (student_id, skill, proficiency_pct)
            VALUES ($1, $2, $3)
            ON CONFLICT (student_id, skill) DO UPDATE
            SET proficiency_pct = EXCLUDED.proficiency_pct
            "#,
        )
        .bind(student_id)
        .bind(skill)
        .bind(proficiency)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: i32,
        name: String,
        join_date: NaiveDate,
        domain: String,
        score: f64,
        level_attempted: i32,
        attempt_date: NaiveDate,
        pass_fail: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        sqlx::query(
            r#"
            INSERT INTO engage.students (student_id, name, goal_state, join_date)
            VALUES ($1, $2, 'NOT_SET', $3)
            ON CONFLICT (student_id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(row.student_id)
        .bind(&row.name)
        .bind(row.join_date)
        .execute(pool)
        .await?;

        let assessment_id: i32 = sqlx::query(
            "SELECT assessment_id FROM engage.assessments WHERE domain = $1",
        )
        .bind(&row.domain)
        .fetch_optional(pool)
        .await?
        .map(|r| r.get("assessment_id"))
        .with_context(|| format!("no assessment configured for domain {}", row.domain))?;

        sqlx::query(
            r#"
            INSERT INTO engage.assessment_attempts
            (student_id, assessment_id, score, level_attempted, attempt_date, pass_fail)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(row.student_id)
        .bind(assessment_id)
        .bind(row.score)
        .bind(row.level_attempted)
        .bind(row.attempt_date)
        .bind(row.pass_fail.as_deref())
        .execute(pool)
        .await?;
        inserted += 1;
    }

    Ok(inserted)
}

pub async fn fetch_attempts(pool: &PgPool) -> anyhow::Result<Vec<AttemptRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT aa.student_id, a.domain, aa.score, aa.level_attempted, a.max_level, aa.attempt_date
        FROM engage.assessment_attempts aa
        JOIN engage.assessments a ON a.assessment_id = aa.assessment_id
        ORDER BY aa.student_id, a.domain, aa.attempt_date
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| AttemptRecord {
            student_id: row.get("student_id"),
            domain: row.get("domain"),
            score: row.get("score"),
            level_attempted: row.get("level_attempted"),
            max_level: row.get("max_level"),
            attempt_date: row.get("attempt_date"),
        })
        .collect())
}

/// Truncate+insert: engineered features are fully recomputed each run.
pub async fn replace_features(pool: &PgPool, features: &[EngineeredFeature]) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("TRUNCATE TABLE engage.engineered_features")
        .execute(&mut *tx)
        .await?;
    for f in features {
        sqlx::query(
            r#"
            INSERT INTO engage.engineered_features
            (student_id, domain, avg_score, attempt_frequency, recency_score, consistency_index)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(f.student_id)
        .bind(&f.domain)
        .bind(f.avg_score)
        .bind(f.attempt_frequency)
        .bind(f.recency_score)
        .bind(f.consistency_index)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn fetch_features(pool: &PgPool) -> anyhow::Result<Vec<EngineeredFeature>> {
    let rows = sqlx::query(
        r#"
        SELECT student_id, domain, avg_score, attempt_frequency, recency_score, consistency_index
        FROM engage.engineered_features
        ORDER BY student_id, domain
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| EngineeredFeature {
            student_id: row.get("student_id"),
            domain: row.get("domain"),
            avg_score: row.get("avg_score"),
            attempt_frequency: row.get("attempt_frequency"),
            recency_score: row.get("recency_score"),
            consistency_index: row.get("consistency_index"),
        })
        .collect())
}

/// Appends this week's point; re-running within the same week overwrites
/// that point, prior weeks are never touched.
pub async fn upsert_weekly_scores(pool: &PgPool, scores: &[WeeklyScore]) -> anyhow::Result<()> {
    for s in scores {
        sqlx::query(
            r#"
            INSERT INTO engage.engagement_scores (student_id, domain, week, engagement_score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, domain, week) DO UPDATE
            SET engagement_score = EXCLUDED.engagement_score
            "#,
        )
        .bind(s.student_id)
        .bind(&s.domain)
        .bind(s.week)
        .bind(s.engagement_score)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn fetch_weekly_scores(pool: &PgPool) -> anyhow::Result<Vec<WeeklyScore>> {
    let rows = sqlx::query(
        r#"
        SELECT student_id, domain, week, engagement_score
        FROM engage.engagement_scores
        ORDER BY student_id, domain, week
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| WeeklyScore {
            student_id: row.get("student_id"),
            domain: row.get("domain"),
            week: row.get("week"),
            engagement_score: row.get("engagement_score"),
        })
        .collect())
}

pub async fn upsert_clusters(pool: &PgPool, assignments: &[ClusterAssignment]) -> anyhow::Result<()> {
    for a in assignments {
        sqlx::query(
            r#"
            INSERT INTO engage.engagement_clusters
            (student_id, domain, cluster, confidence, last_updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, domain) DO UPDATE
            SET cluster = EXCLUDED.cluster, confidence = EXCLUDED.confidence,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(a.student_id)
        .bind(&a.domain)
        .bind(a.cluster.as_str())
        .bind(a.confidence)
        .bind(a.last_updated)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn fetch_clusters(pool: &PgPool) -> anyhow::Result<Vec<ClusterAssignment>> {
    let rows = sqlx::query(
        r#"
        SELECT student_id, domain, cluster, confidence, last_updated
        FROM engage.engagement_clusters
        ORDER BY student_id, domain
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut assignments = Vec::new();
    for row in rows {
        let label: String = row.get("cluster");
        let cluster = Cluster::parse(&label)
            .with_context(|| format!("unknown cluster label in storage: {label}"))?;
        assignments.push(ClusterAssignment {
            student_id: row.get("student_id"),
            domain: row.get("domain"),
            cluster,
            confidence: row.get("confidence"),
            last_updated: row.get("last_updated"),
        });
    }
    Ok(assignments)
}

/// Writes a transition result; only called when the label changed.
pub async fn update_cluster_label(
    pool: &PgPool,
    student_id: i32,
    domain: &str,
    cluster: Cluster,
    updated: NaiveDate,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE engage.engagement_clusters
        SET cluster = $1, last_updated = $2
        WHERE student_id = $3 AND domain = $4
        "#,
    )
    .bind(cluster.as_str())
    .bind(updated)
    .bind(student_id)
    .bind(domain)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_skill_weights(pool: &PgPool) -> anyhow::Result<Vec<DomainSkillWeight>> {
    let rows = sqlx::query(
        r#"
        SELECT d.name AS domain, s.name AS skill, w.weight
        FROM engage.domain_skill_weights w
        JOIN engage.domains d ON d.domain_id = w.domain_id
        JOIN engage.skills s ON s.skill_id = w.skill_id
        ORDER BY d.name, w.weight DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DomainSkillWeight {
            domain: row.get("domain"),
            skill: row.get("skill"),
            weight: row.get("weight"),
        })
        .collect())
}

pub async fn fetch_skill_profile(pool: &PgPool, student_id: i32) -> anyhow::Result<HashMap<String, f64>> {
    let rows = sqlx::query(
        "SELECT skill, proficiency_pct FROM engage.skill_profiles WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("skill"), row.get("proficiency_pct")))
        .collect())
}

/// Fallback proficiency when no skill profile exists: per-domain average
/// attempt score, keyed by domain name.
pub async fn fetch_attempt_averages(pool: &PgPool, student_id: i32) -> anyhow::Result<HashMap<String, f64>> {
    let rows = sqlx::query(
        r#"
        SELECT a.domain, AVG(aa.score) AS proficiency_pct
        FROM engage.assessment_attempts aa
        JOIN engage.assessments a ON a.assessment_id = aa.assessment_id
        WHERE aa.student_id = $1
        GROUP BY a.domain
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("domain"), row.get("proficiency_pct")))
        .collect())
}

pub async fn fetch_students(pool: &PgPool) -> anyhow::Result<Vec<StudentRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT student_id, name, goal_state, selected_goal, join_date
        FROM engage.students
        ORDER BY student_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let goal_state: String = row.get("goal_state");
            StudentRecord {
                student_id: row.get("student_id"),
                name: row.get("name"),
                goal_state: GoalState::parse(&goal_state),
                selected_goal: row.get("selected_goal"),
                join_date: row.get("join_date"),
            }
        })
        .collect())
}

pub async fn fetch_attempt_stats(pool: &PgPool, student_id: i32) -> anyhow::Result<AttemptStats> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total_attempts, MAX(attempt_date) AS last_attempt
        FROM engage.assessment_attempts
        WHERE student_id = $1
        "#,
    )
    .bind(student_id)
    .fetch_one(pool)
    .await?;

    Ok(AttemptStats {
        total_attempts: row.get("total_attempts"),
        last_attempt: row.get("last_attempt"),
    })
}

/// Delete-then-insert; scope is one student or, with None, the whole
/// table (global model refresh).
pub async fn replace_likelihoods(
    pool: &PgPool,
    scope: Option<i32>,
    likelihoods: &[DomainLikelihood],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    match scope {
        Some(student_id) => {
            sqlx::query("DELETE FROM engage.domain_likelihood WHERE student_id = $1")
                .bind(student_id)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            sqlx::query("DELETE FROM engage.domain_likelihood")
                .execute(&mut *tx)
                .await?;
        }
    }
    for l in likelihoods {
        sqlx::query(
            r#"
            INSERT INTO engage.domain_likelihood (student_id, domain, likelihood_score)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(l.student_id)
        .bind(&l.domain)
        .bind(l.likelihood_score)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn fetch_likelihoods(pool: &PgPool, student_id: i32) -> anyhow::Result<Vec<DomainLikelihood>> {
    let rows = sqlx::query(
        r#"
        SELECT student_id, domain, likelihood_score
        FROM engage.domain_likelihood
        WHERE student_id = $1
        ORDER BY likelihood_score DESC, domain
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DomainLikelihood {
            student_id: row.get("student_id"),
            domain: row.get("domain"),
            likelihood_score: row.get("likelihood_score"),
        })
        .collect())
}

pub async fn upsert_actions(pool: &PgPool, decisions: &[ActionDecision]) -> anyhow::Result<()> {
    for d in decisions {
        sqlx::query(
            r#"
            INSERT INTO engage.action_outputs
            (student_id, domain, mentor_action, content_action, nudge_action, reason, decided_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (student_id, domain) DO UPDATE
            SET mentor_action = EXCLUDED.mentor_action,
                content_action = EXCLUDED.content_action,
                nudge_action = EXCLUDED.nudge_action,
                reason = EXCLUDED.reason,
                decided_at = EXCLUDED.decided_at
            "#,
        )
        .bind(d.student_id)
        .bind(&d.domain)
        .bind(d.mentor_action.map(|a| a.as_str()))
        .bind(d.content_action.as_str())
        .bind(d.nudge_action.map(|a| a.as_str()))
        .bind(&d.reason)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Rows eligible for model training/prediction: features joined with a
/// proficiency value and a cluster assignment. The proficiency join key
/// follows the profile convention of storing domain-level entries under
/// the domain name.
pub async fn fetch_labeled_rows(pool: &PgPool) -> anyhow::Result<Vec<LabeledFeatureRow>> {
    let rows = sqlx::query(
        r#"
        SELECT ef.student_id, ef.domain, ef.avg_score, ef.attempt_frequency,
               ef.recency_score, ef.consistency_index,
               sp.proficiency_pct, ec.cluster
        FROM engage.engineered_features ef
        JOIN engage.skill_profiles sp
          ON sp.student_id = ef.student_id AND sp.skill = ef.domain
        JOIN engage.engagement_clusters ec
          ON ec.student_id = ef.student_id AND ec.domain = ef.domain
        ORDER BY ef.student_id, ef.domain
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut labeled = Vec::new();
    for row in rows {
        let label: String = row.get("cluster");
        let cluster = Cluster::parse(&label)
            .with_context(|| format!("unknown cluster label in storage: {label}"))?;
        labeled.push(LabeledFeatureRow {
            student_id: row.get("student_id"),
            domain: row.get("domain"),
            avg_score: row.get("avg_score"),
            attempt_frequency: row.get("attempt_frequency"),
            recency_score: row.get("recency_score"),
            consistency_index: row.get("consistency_index"),
            proficiency_pct: row.get("proficiency_pct"),
            cluster,
        });
    }
    Ok(labeled)
}

pub async fn save_model_artifact(pool: &PgPool, artifact: &ModelArtifact) -> anyhow::Result<()> {
    let payload = serde_json::to_value(artifact)?;
    sqlx::query(
        r#"
        INSERT INTO engage.model_artifacts (name, version, payload)
        VALUES ($1, $2, $3)
        ON CONFLICT (name, version) DO UPDATE
        SET payload = EXCLUDED.payload, trained_at = now()
        "#,
    )
    .bind(crate::model::ARTIFACT_NAME)
    .bind(artifact.version)
    .bind(payload)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn next_model_version(pool: &PgPool) -> anyhow::Result<i32> {
    let row = sqlx::query(
        "SELECT COALESCE(MAX(version), 0) AS version FROM engage.model_artifacts WHERE name = $1",
    )
    .bind(crate::model::ARTIFACT_NAME)
    .fetch_one(pool)
    .await?;
    let current: i32 = row.get("version");
    Ok(current + 1)
}

/// Latest trained model, or None when training has never run. "Not yet
/// trained" is a state the caller decides how to handle, not a failure.
pub async fn load_latest_model(pool: &PgPool) -> anyhow::Result<Option<ModelArtifact>> {
    let row = sqlx::query(
        r#"
        SELECT payload FROM engage.model_artifacts
        WHERE name = $1
        ORDER BY version DESC
        LIMIT 1
        "#,
    )
    .bind(crate::model::ARTIFACT_NAME)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let payload: serde_json::Value = row.get("payload");
            let artifact = serde_json::from_value(payload)?;
            Ok(Some(artifact))
        }
        None => Ok(None),
    }
}
