use thiserror::Error;

/// Hard failure modes of the pipeline. Data insufficiency (population too
/// small to cluster, too little weekly history for a trend, a single
/// attempt date) is deliberately not represented here: those units are
/// skipped and counted, never surfaced as errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing reference data: {0}")]
    MissingReferenceData(String),

    #[error("likelihood model unavailable: {0}")]
    ModelUnavailable(String),
}
