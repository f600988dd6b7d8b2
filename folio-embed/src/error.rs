//! Error types for the embedding system

/// Result type for embedding operations.
///
/// This is a convenience type alias that uses [`EmbedError`] as the error type.
/// Used throughout the crate for operations that can fail.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type covering provider configuration, transport, and generation
/// failures.
///
/// Configuration problems surface before any request is made; runtime
/// failures carry the provider they came from so a fallback chain can report
/// every attempt.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when provider configuration is invalid or incomplete
    #[error("Invalid provider configuration: {message}")]
    InvalidConfig { message: String },

    /// Error reported by a specific provider during embedding generation
    #[error("Provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    /// Every provider in the fallback chain failed for one request
    #[error("All embedding providers failed ({})", .attempts.iter().map(|(p, e)| format!("{p}: {e}")).collect::<Vec<_>>().join("; "))]
    AllProvidersFailed { attempts: Vec<(String, String)> },

    /// HTTP transport errors talking to a remote provider
    #[error("HTTP transport error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// IO errors, e.g. while reading credentials from disk
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    ///
    /// Used by provider constructors to fail fast on missing endpoints,
    /// credentials, regions, or out-of-range dimension requests.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a provider failure carrying the provider's name.
    pub fn provider<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_providers_failed_lists_each_attempt() {
        let err = EmbedError::AllProvidersFailed {
            attempts: vec![
                ("openai".to_string(), "HTTP 500".to_string()),
                ("ollama".to_string(), "connection refused".to_string()),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("openai: HTTP 500"));
        assert!(message.contains("ollama: connection refused"));
    }

    #[test]
    fn test_convenience_constructors() {
        let err = EmbedError::invalid_config("missing api key");
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));

        let err = EmbedError::provider("vertex", "bad response");
        assert_eq!(
            err.to_string(),
            "Provider 'vertex' failed: bad response"
        );
    }
}
