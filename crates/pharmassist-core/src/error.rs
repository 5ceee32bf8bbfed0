use thiserror::Error;

use crate::types::StepId;

/// Infrastructure errors: configuration, LLM transport, I/O.
#[derive(Debug, Error)]
pub enum PharmaError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PharmaError>;

/// Malformed or missing input records.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl DataError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// The assessment capability failed or returned a value of the wrong shape.
#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("capability call failed: {0}")]
    Capability(String),

    #[error("capability call timed out after {0}s")]
    Timeout(u64),

    #[error("response does not conform to {shape}: {reason}")]
    NonConforming { shape: String, reason: String },
}

impl From<PharmaError> for AssessmentError {
    fn from(e: PharmaError) -> Self {
        Self::Capability(e.to_string())
    }
}

/// Why a single workflow step failed.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Assessment(#[from] AssessmentError),

    /// The executor detected a violated state invariant.
    #[error("state invariant violated: {0}")]
    State(String),
}

/// A failed workflow run: the step that raised the error, and why.
#[derive(Debug, Error)]
#[error("step `{step}` failed: {cause}")]
pub struct WorkflowError {
    pub step: StepId,
    #[source]
    pub cause: StepFailure,
}

impl WorkflowError {
    pub fn new(step: StepId, cause: impl Into<StepFailure>) -> Self {
        Self {
            step,
            cause: cause.into(),
        }
    }
}
