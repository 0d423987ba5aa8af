//! Error types for the Sleuth research core.
//!
//! Uses `thiserror` for public API error types. Every domain error reports an
//! [`ErrorKind`] so the retry policy and the collaborator fallbacks can make
//! decisions without inspecting messages.

use crate::classify::{ErrorKind, classify};

/// Top-level error type for the Sleuth core library.
///
/// Only [`SleuthError::PoolShutdown`] and [`SleuthError::PoolStart`] escape a
/// research run; every other failure is absorbed by a stage fallback.
#[derive(Debug, thiserror::Error)]
pub enum SleuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Worker pool has been shut down")]
    PoolShutdown,

    #[error("Worker pool could not be started: {message}")]
    PoolStart { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SleuthError {
    /// Whether this error must abort the whole process rather than a single stage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PoolShutdown | Self::PoolStart { .. })
    }
}

/// Errors from the shared HTTP transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {message}")]
    Request { message: String },

    #[error("Malformed response body: {message}")]
    Decode { message: String },

    #[error("Deadline of {timeout_ms}ms exceeded")]
    Deadline { timeout_ms: u64 },

    #[error("HTTP client could not be built: {message}")]
    Setup { message: String },

    #[error("HTTP client has been closed")]
    Closed,
}

impl HttpError {
    /// Map this failure onto the error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HttpError::Connection { .. } => ErrorKind::Network,
            HttpError::Status { .. } | HttpError::Request { .. } => ErrorKind::Api,
            HttpError::Decode { .. } => ErrorKind::DataCorruption,
            HttpError::Deadline { .. } => ErrorKind::Timeout,
            HttpError::Setup { .. } | HttpError::Closed => ErrorKind::Configuration,
        }
    }

    /// Convert a transport error from `reqwest`, keeping its category.
    ///
    /// `timeout_ms` is the per-request timeout the client was configured with.
    pub fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        let message = err.to_string();
        match classify(&err) {
            ErrorKind::Timeout => HttpError::Deadline { timeout_ms },
            ErrorKind::Network => HttpError::Connection { message },
            ErrorKind::DataCorruption => HttpError::Decode { message },
            ErrorKind::Configuration => HttpError::Setup { message },
            _ => match err.status() {
                Some(status) => HttpError::Status {
                    status: status.as_u16(),
                    body: message,
                },
                None => HttpError::Request { message },
            },
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from credential lookup.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Credential in '{var}' is empty")]
    Empty { var: String },
}

/// A classified failure raised by, or on behalf of, an agent collaborator.
///
/// Wraps the human-readable message, the taxonomy kind, and the original cause.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AgentError {
    pub message: String,
    pub kind: ErrorKind,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl AgentError {
    pub fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            cause: None,
        }
    }

    pub fn with_cause(
        mut self,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Classify an arbitrary failure and wrap it.
    ///
    /// An `AgentError` passed in is returned unchanged so its kind is preserved.
    pub fn from_failure<E>(operation: &str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = Box::new(err);
        match boxed.downcast::<AgentError>() {
            Ok(agent) => *agent,
            Err(other) => {
                let kind = classify(&*other);
                Self {
                    message: format!("{operation} failed: {other}"),
                    kind,
                    cause: Some(other),
                }
            }
        }
    }

    /// A structurally malformed collaborator response.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(message, ErrorKind::DataCorruption)
    }
}

impl From<HttpError> for AgentError {
    fn from(err: HttpError) -> Self {
        let kind = err.kind();
        Self {
            message: err.to_string(),
            kind,
            cause: Some(Box::new(err)),
        }
    }
}

impl From<CredentialError> for AgentError {
    fn from(err: CredentialError) -> Self {
        Self {
            message: err.to_string(),
            kind: ErrorKind::Authentication,
            cause: Some(Box::new(err)),
        }
    }
}

/// A type alias for results using the top-level `SleuthError`.
pub type Result<T> = std::result::Result<T, SleuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_http() {
        let err = SleuthError::Http(HttpError::Status {
            status: 503,
            body: "unavailable".into(),
        });
        assert_eq!(err.to_string(), "HTTP error: HTTP 503: unavailable");
    }

    #[test]
    fn test_error_display_config() {
        let err = SleuthError::Config(ConfigError::MissingField {
            field: "llm.api_key_env".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required field: llm.api_key_env"
        );
    }

    #[test]
    fn test_error_display_agent() {
        let err = AgentError::new("no candidates", ErrorKind::DataCorruption);
        assert_eq!(err.to_string(), "DATA_CORRUPTION_ERROR: no candidates");
    }

    #[test]
    fn test_only_pool_errors_are_fatal() {
        assert!(SleuthError::PoolShutdown.is_fatal());
        assert!(
            SleuthError::PoolStart {
                message: "no threads".into()
            }
            .is_fatal()
        );
        assert!(!SleuthError::Http(HttpError::Closed).is_fatal());
    }

    #[test]
    fn test_http_error_kinds() {
        assert_eq!(
            HttpError::Connection {
                message: "refused".into()
            }
            .kind(),
            ErrorKind::Network
        );
        assert_eq!(
            HttpError::Status {
                status: 500,
                body: String::new()
            }
            .kind(),
            ErrorKind::Api
        );
        assert_eq!(HttpError::Deadline { timeout_ms: 10 }.kind(), ErrorKind::Timeout);
        assert_eq!(
            HttpError::Decode {
                message: "eof".into()
            }
            .kind(),
            ErrorKind::DataCorruption
        );
        assert_eq!(HttpError::Closed.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_from_failure_preserves_agent_kind() {
        let inner = AgentError::new("bad key", ErrorKind::Authentication);
        let wrapped = AgentError::from_failure("search", inner);
        assert_eq!(wrapped.kind, ErrorKind::Authentication);
        assert_eq!(wrapped.message, "bad key");
    }

    #[test]
    fn test_from_failure_classifies_cause() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let wrapped = AgentError::from_failure("reflection", serde_err);
        assert_eq!(wrapped.kind, ErrorKind::DataCorruption);
        assert!(wrapped.message.starts_with("reflection failed:"));
        assert!(wrapped.cause.is_some());
    }

    #[test]
    fn test_credential_error_is_authentication() {
        let err: AgentError = CredentialError::EnvVarMissing {
            var: "GEMINI_API_KEY".into(),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }
}
