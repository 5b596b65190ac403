use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod actions;
mod clustering;
mod db;
mod error;
mod features;
mod likelihood;
mod model;
mod models;
mod pipeline;
mod recommend;
mod report;
mod scale;
mod scoring;
mod transition;

#[derive(Parser)]
#[command(name = "engage-pipeline")]
#[command(about = "Engagement analytics and recommendation pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Deterministic,
    Model,
}

impl From<StrategyArg> for likelihood::Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Deterministic => likelihood::Strategy::Deterministic,
            StrategyArg::Model => likelihood::Strategy::Model,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small fixed dataset for local runs
    Seed,
    /// Import assessment attempts from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Recompute engineered features from the attempt history
    Features,
    /// Score engagement and append this week's series point
    Score,
    /// Cluster each domain's students into the four behavior buckets
    Cluster,
    /// Apply trend-based cluster transitions
    Transitions,
    /// Train the probabilistic domain-likelihood model
    TrainModel,
    /// Compute domain likelihoods for undeclared students
    Likelihood {
        #[arg(long)]
        student: Option<i32>,
        #[arg(long, value_enum, default_value_t = StrategyArg::Deterministic)]
        strategy: StrategyArg,
        /// Fall back to the deterministic strategy when no model exists
        #[arg(long, default_value_t = false)]
        fallback: bool,
    },
    /// Show recommendation status and top domains
    Recommend {
        #[arg(long)]
        student: Option<i32>,
    },
    /// Map clusters and likelihoods to action decisions
    Actions,
    /// Run the full batch pipeline
    Run,
    /// Generate a markdown mentor report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} attempts from {}.", csv.display());
        }
        Commands::Features => {
            println!("{}", pipeline::run_features(&pool, today).await?);
        }
        Commands::Score => {
            println!("{}", pipeline::run_scoring(&pool, today).await?);
        }
        Commands::Cluster => {
            println!("{}", pipeline::run_clustering(&pool, today).await?);
        }
        Commands::Transitions => {
            println!("{}", pipeline::run_transitions(&pool, today).await?);
        }
        Commands::TrainModel => {
            println!("{}", pipeline::run_training(&pool).await?);
        }
        Commands::Likelihood { student, strategy, fallback } => {
            let summary =
                pipeline::run_likelihood(&pool, strategy.into(), student, fallback).await?;
            println!("{summary}");
        }
        Commands::Recommend { student } => {
            let students = db::fetch_students(&pool).await?;
            for record in &students {
                if let Some(only) = student {
                    if record.student_id != only {
                        continue;
                    }
                } else if record.goal_state == models::GoalState::Set {
                    continue;
                }

                let (outcome, ranked) =
                    pipeline::classify_student(&pool, record, today).await?;
                let pathway = outcome.top_domain.as_deref().unwrap_or("-");
                let top3: Vec<String> = ranked
                    .iter()
                    .take(3)
                    .map(|l| format!("{} {:.2}", l.domain, l.likelihood_score))
                    .collect();
                println!(
                    "- {} ({}): {} pathway {} [{}]",
                    record.name,
                    record.student_id,
                    outcome.status.as_str(),
                    pathway,
                    if top3.is_empty() { "no likelihoods".to_string() } else { top3.join(", ") }
                );
            }
        }
        Commands::Actions => {
            println!("{}", pipeline::run_actions(&pool).await?);
        }
        Commands::Run => {
            for summary in pipeline::run_all(&pool, today).await? {
                println!("{summary}");
            }
        }
        Commands::Report { out } => {
            let report = report::gather_and_build(&pool, today).await?;
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
