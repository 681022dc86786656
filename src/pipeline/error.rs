use thiserror::Error;

/// Error taxonomy for the classification core.
///
/// `NotFitted` is always recoverable by fitting first. `Configuration` is
/// fatal for the call but never corrupts already-fitted state.
/// `DegenerateInput` marks zero-variance numerics that would otherwise divide
/// by zero; predict paths catch it and report an undetermined confidence
/// instead of propagating.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{component} must be fitted before use")]
    NotFitted { component: &'static str },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}
