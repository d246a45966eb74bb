use thiserror::Error;

/// h2credit engine errors.
///
/// A rejected verdict is not represented here: rejection is a valid outcome carried by
/// [`crate::types::VerificationVerdict`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum H2Error {
    #[error("extraction failed: {reason}")]
    Extraction { reason: String },

    #[error("invalid report field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("collaborator '{collaborator}' failed: {message}")]
    SubmissionFailure {
        collaborator: String,
        message: String,
    },

    #[error("collaborator '{collaborator}' did not answer within {timeout_ms}ms")]
    SubmissionTimeout {
        collaborator: String,
        timeout_ms: u64,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl H2Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn stage_violation(expected: &str, actual: &str) -> Self {
        Self::InvariantViolation(format!(
            "status order violation: expected '{}', got '{}'",
            expected, actual
        ))
    }

    pub fn submission(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SubmissionFailure {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable kind, used in outcomes and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Extraction { .. } => "extraction_failure",
            Self::Validation { .. } => "validation_error",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::SubmissionFailure { .. } => "submission_failure",
            Self::SubmissionTimeout { .. } => "submission_timeout",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Errors a user can fix by correcting their input.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::Extraction { .. } | Self::Validation { .. })
    }
}

impl From<serde_json::Error> for H2Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
