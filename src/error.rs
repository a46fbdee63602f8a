// src/error.rs

use thiserror::Error;

/// Hard failures surfaced to callers of the scoring pipeline.
///
/// Soft conditions (unseen categorical values, missing attributes, absent
/// snapshots on load) are recovered locally and never reach this enum.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("model is not trained yet; run training before scoring or feedback")]
    NotTrained,

    #[error("invalid feedback kind '{0}'; expected one of 'true', 'higher', 'lower'")]
    InvalidFeedbackKind(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("prediction failed: {0}")]
    Prediction(String),
}
