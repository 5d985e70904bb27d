//! Error types for subnet-miner

use thiserror::Error;

/// Result type alias using the miner's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Miner error types with helpful messages and suggestions
///
/// None of these are fatal to the process: the pipeline turns every per-task
/// error into a terminal task outcome and keeps going.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (E100-E199)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Policy file '{0}' could not be parsed: {1}")]
    InvalidPolicy(String, String),

    // Budget errors (E200-E299)
    #[error("Unknown provider '{0}'. Add it to token-budgets.json before spending against it.")]
    UnknownProvider(String),

    // Inference errors (E300-E399)
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Inference timed out after {0} seconds")]
    InferenceTimeout(u64),

    #[error("Inference returned an empty response")]
    EmptyResponse,

    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check MINER_API_KEY or OPENROUTER_API_KEY.")]
    LLMError(String),

    // Persistence errors (E400-E499)
    #[error("Persistence failed for '{0}': {1}")]
    PersistenceFailed(String, String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    // Collaborator errors (E500-E599)
    #[error("Submission rejected for task '{0}': {1}")]
    SubmissionFailed(String, String),

    #[error("Validator feedback unavailable for task '{0}'")]
    FeedbackUnavailable(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "E100",
            Self::InvalidPolicy(..) => "E101",
            Self::UnknownProvider(_) => "E200",
            Self::InferenceFailed(_) => "E300",
            Self::InferenceTimeout(_) => "E301",
            Self::EmptyResponse => "E302",
            Self::NetworkError(_) => "E303",
            Self::LLMError(_) => "E304",
            Self::PersistenceFailed(..) => "E400",
            Self::Json(_) => "E401",
            Self::SubmissionFailed(..) => "E500",
            Self::FeedbackUnavailable(_) => "E501",
            Self::SigningFailed(_) => "E502",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::UnknownProvider(provider) => Some(format!(
                "subnet-miner budget set {} --allowance <tokens>",
                provider
            )),
            Self::LLMError(_) => Some("export OPENROUTER_API_KEY=...".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::ConfigError(_) => Some("subnet-miner config list".to_string()),
            _ => None,
        }
    }

    /// Whether this error terminates the current task as an inference failure
    pub fn is_inference_failure(&self) -> bool {
        matches!(
            self,
            Self::InferenceFailed(_)
                | Self::InferenceTimeout(_)
                | Self::EmptyResponse
                | Self::NetworkError(_)
                | Self::LLMError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_grouped() {
        assert_eq!(Error::ConfigError("x".into()).code(), "E100");
        assert_eq!(Error::UnknownProvider("x".into()).code(), "E200");
        assert_eq!(Error::InferenceTimeout(5).code(), "E301");
        assert_eq!(Error::PersistenceFailed("a".into(), "b".into()).code(), "E400");
        assert_eq!(Error::Other("x".into()).code(), "E9999");
    }

    #[test]
    fn test_inference_failure_classification() {
        assert!(Error::EmptyResponse.is_inference_failure());
        assert!(Error::InferenceTimeout(30).is_inference_failure());
        assert!(!Error::UnknownProvider("openai".into()).is_inference_failure());
    }

    #[test]
    fn test_suggestion_for_unknown_provider() {
        let err = Error::UnknownProvider("google".into());
        assert!(err.suggestion().unwrap().contains("google"));
        assert!(Error::EmptyResponse.suggestion().is_none());
    }
}
