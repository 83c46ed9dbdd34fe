//! Error types for the orchestration layer

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
///
/// Tool failures never show up here: they are folded into `ToolResult`
/// parts and handed back to the model. Everything in this enum either
/// halts the call or is propagated unchanged to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// API error from the model server
    #[error("API error: {0}")]
    Api(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Tool definition or registry error
    #[error("Tool error: {0}")]
    Tool(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// The model kept requesting tools past the configured ceiling
    #[error("Iteration limit of {max} model requests exceeded")]
    IterationLimit { max: usize },

    /// Conversation history breaks the system/user/model alternation rule
    #[error("History alternation violated at message {index}: {reason}")]
    HistoryAlternation { index: usize, reason: String },

    /// The adapter's declared capabilities cannot serve the request
    #[error("Unsupported request: {0}")]
    Unsupported(String),

    /// Error raised by a model adapter
    #[error("Adapter '{adapter}' failed: {message}")]
    Adapter { adapter: String, message: String },

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create an unsupported-request error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create an adapter error
    pub fn adapter(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Adapter {
            adapter: adapter.into(),
            message: message.into(),
        }
    }

    /// Create a history alternation error
    pub fn alternation(index: usize, reason: impl Into<String>) -> Self {
        Error::HistoryAlternation {
            index,
            reason: reason.into(),
        }
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// Whether retrying the operation that produced this error can help.
    ///
    /// Only transport-level conditions qualify. Caller mistakes (bad history,
    /// bad config) and the iteration ceiling are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::Timeout | Error::Stream(_) => true,
            Error::Api(msg) => {
                // 5xx responses are transient, 4xx are not
                ["500", "502", "503", "504"]
                    .iter()
                    .any(|code| msg.contains(code))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("Invalid model");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model");
    }

    #[test]
    fn test_error_iteration_limit() {
        let err = Error::IterationLimit { max: 3 };
        assert_eq!(
            err.to_string(),
            "Iteration limit of 3 model requests exceeded"
        );
    }

    #[test]
    fn test_error_alternation() {
        let err = Error::alternation(2, "two user messages in a row");
        assert!(matches!(err, Error::HistoryAlternation { index: 2, .. }));
        assert_eq!(
            err.to_string(),
            "History alternation violated at message 2: two user messages in a row"
        );
    }

    #[test]
    fn test_error_adapter() {
        let err = Error::adapter("openai", "connection reset");
        assert_eq!(err.to_string(), "Adapter 'openai' failed: connection reset");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::timeout().is_retryable());
        assert!(Error::stream("connection dropped").is_retryable());
        assert!(Error::api("API error 503 Service Unavailable: busy").is_retryable());
        assert!(!Error::api("API error 401 Unauthorized: bad key").is_retryable());
        assert!(!Error::config("missing model").is_retryable());
        assert!(!Error::IterationLimit { max: 1 }.is_retryable());
        assert!(!Error::alternation(0, "x").is_retryable());
    }
}
