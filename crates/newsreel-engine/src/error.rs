//! Engine error types.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Model call failed: {0}")]
    ModelFailed(String),

    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Browser error: {0}")]
    Browser(#[from] newsreel_browser::BrowserError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn search_failed(msg: impl Into<String>) -> Self {
        Self::SearchFailed(msg.into())
    }

    pub fn model_failed(msg: impl Into<String>) -> Self {
        Self::ModelFailed(msg.into())
    }

    pub fn retrieval_failed(msg: impl Into<String>) -> Self {
        Self::RetrievalFailed(msg.into())
    }

    pub fn session_invalid(msg: impl Into<String>) -> Self {
        Self::SessionInvalid(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether this looks like a transient platform error worth retrying.
    ///
    /// Gateway errors and timeouts come back from the platform as page
    /// text or navigation failures, so this classifies by message.
    pub fn is_transient(&self) -> bool {
        let msg = self.to_string().to_lowercase();

        if msg.contains("timed out") || msg.contains("timeout") {
            return true;
        }

        // Gateway-class upstream failures
        if msg.contains("502")
            || msg.contains("503")
            || msg.contains("504")
            || msg.contains("bad gateway")
            || msg.contains("gateway timeout")
            || msg.contains("service unavailable")
        {
            return true;
        }

        if msg.contains("connection reset") || msg.contains("connection refused") {
            return true;
        }

        false
    }

    /// Whether the caller should run the login flow before retrying.
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, EngineError::SessionInvalid(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::search_failed("upstream 504 Gateway Timeout").is_transient());
        assert!(EngineError::search_failed("navigation timed out").is_transient());
        assert!(!EngineError::search_failed("no results container").is_transient());
        assert!(!EngineError::session_invalid("sign-in required").is_transient());
    }

    #[test]
    fn test_session_invalid_classification() {
        assert!(EngineError::session_invalid("needs login").is_session_invalid());
        assert!(!EngineError::search_failed("boom").is_session_invalid());
    }
}
