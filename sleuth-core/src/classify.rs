//! Error classification and fallback guards.
//!
//! [`classify`] maps any failure onto a fixed [`ErrorKind`] taxonomy by walking
//! the `source()` chain and downcasting to the error types we know about. The
//! mapping depends only on the failure itself, never on call history, so the
//! retry policy can rely on it being deterministic.
//!
//! [`Guard`] wraps a fallible stage operation: it classifies and logs the
//! failure, then either substitutes a fallback value or re-raises the failure
//! as a typed [`AgentError`].

use crate::error::{AgentError, ConfigError, CredentialError, HttpError, SleuthError};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::future::Future;
use tracing::{debug, warn};

/// Failure taxonomy shared by the retry policy and stage fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Connection refused, reset, or another network fault.
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    /// HTTP status or request-level failure.
    #[serde(rename = "API_ERROR")]
    Api,
    /// An operation exceeded its deadline.
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    /// Missing or invalid credential.
    #[serde(rename = "AUTHENTICATION_ERROR")]
    Authentication,
    /// Missing or invalid configuration value.
    #[serde(rename = "CONFIGURATION_ERROR")]
    Configuration,
    /// Structurally malformed response or type mismatch.
    #[serde(rename = "DATA_CORRUPTION_ERROR")]
    DataCorruption,
    /// Anything else.
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorKind {
    /// Kinds retried by default.
    pub const RETRIABLE: [ErrorKind; 3] = [ErrorKind::Network, ErrorKind::Api, ErrorKind::Timeout];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Api => "API_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
            ErrorKind::DataCorruption => "DATA_CORRUPTION_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a failure.
///
/// The first error in the `source()` chain with a known category decides the
/// kind; a chain with no known error is [`ErrorKind::Unknown`].
pub fn classify(err: &(dyn StdError + 'static)) -> ErrorKind {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(kind) = known_kind(e) {
            return kind;
        }
        current = e.source();
    }
    ErrorKind::Unknown
}

fn known_kind(err: &(dyn StdError + 'static)) -> Option<ErrorKind> {
    if let Some(e) = err.downcast_ref::<AgentError>() {
        return Some(e.kind);
    }
    if let Some(e) = err.downcast_ref::<HttpError>() {
        return Some(e.kind());
    }
    if err.is::<ConfigError>() || err.is::<figment::Error>() {
        return Some(ErrorKind::Configuration);
    }
    if err.is::<CredentialError>() || err.is::<std::env::VarError>() {
        return Some(ErrorKind::Authentication);
    }
    if let Some(e) = err.downcast_ref::<SleuthError>() {
        return sleuth_kind(e);
    }
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        return Some(reqwest_kind(e));
    }
    if err.is::<tokio::time::error::Elapsed>() {
        return Some(ErrorKind::Timeout);
    }
    if err.is::<serde_json::Error>() {
        return Some(ErrorKind::DataCorruption);
    }
    if let Some(e) = err.downcast_ref::<std::io::Error>() {
        return io_kind(e);
    }
    None
}

fn sleuth_kind(err: &SleuthError) -> Option<ErrorKind> {
    match err {
        SleuthError::Http(e) => Some(e.kind()),
        SleuthError::Config(_) => Some(ErrorKind::Configuration),
        SleuthError::Credential(_) => Some(ErrorKind::Authentication),
        SleuthError::Agent(e) => Some(e.kind),
        SleuthError::Serialization(_) => Some(ErrorKind::DataCorruption),
        SleuthError::Io(e) => io_kind(e),
        SleuthError::PoolShutdown | SleuthError::PoolStart { .. } => Some(ErrorKind::Unknown),
    }
}

fn reqwest_kind(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() {
        ErrorKind::Network
    } else if err.is_decode() || err.is_body() {
        ErrorKind::DataCorruption
    } else if err.is_builder() {
        ErrorKind::Configuration
    } else if err.is_status() || err.is_request() || err.is_redirect() {
        ErrorKind::Api
    } else {
        ErrorKind::Network
    }
}

fn io_kind(err: &std::io::Error) -> Option<ErrorKind> {
    use std::io::ErrorKind as Io;
    match err.kind() {
        Io::ConnectionRefused
        | Io::ConnectionReset
        | Io::ConnectionAborted
        | Io::NotConnected
        | Io::BrokenPipe
        | Io::TimedOut => Some(ErrorKind::Network),
        Io::InvalidData | Io::UnexpectedEof => Some(ErrorKind::DataCorruption),
        _ => None,
    }
}

/// Wraps a stage operation with classification, logging, and a fallback.
#[derive(Debug, Clone, Copy)]
pub struct Guard<'a> {
    operation: &'a str,
    log_errors: bool,
}

impl<'a> Guard<'a> {
    pub fn new(operation: &'a str) -> Self {
        Self {
            operation,
            log_errors: true,
        }
    }

    /// Do not log caught failures.
    pub fn quiet(mut self) -> Self {
        self.log_errors = false;
        self
    }

    /// Run `future`; on failure, classify it and return `fallback(&error)` instead.
    pub async fn or_fallback<T, E, Fut, F>(self, future: Fut, fallback: F) -> T
    where
        Fut: Future<Output = Result<T, E>>,
        E: StdError + Send + Sync + 'static,
        F: FnOnce(&AgentError) -> T,
    {
        match self.classified(future).await {
            Ok(value) => value,
            Err(err) => {
                if self.log_errors {
                    warn!(
                        operation = self.operation,
                        kind = %err.kind,
                        error = %err.message,
                        "Stage failed, using fallback output"
                    );
                }
                fallback(&err)
            }
        }
    }

    /// Run `future`; on failure, re-raise as a classified [`AgentError`].
    pub async fn classified<T, E, Fut>(self, future: Fut) -> Result<T, AgentError>
    where
        Fut: Future<Output = Result<T, E>>,
        E: StdError + Send + Sync + 'static,
    {
        future.await.map_err(|e| {
            let err = AgentError::from_failure(self.operation, e);
            if self.log_errors {
                debug!(operation = self.operation, kind = %err.kind, "Stage failure classified");
            }
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names_match_display() {
        for kind in [
            ErrorKind::Network,
            ErrorKind::Api,
            ErrorKind::Timeout,
            ErrorKind::Authentication,
            ErrorKind::Configuration,
            ErrorKind::DataCorruption,
            ErrorKind::Unknown,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
            assert_eq!(serde_json::from_str::<ErrorKind>(&json).unwrap(), kind);
        }
    }

    #[test]
    fn test_http_errors_follow_table() {
        let refused = HttpError::Connection {
            message: "connection refused".into(),
        };
        assert_eq!(classify(&refused), ErrorKind::Network);

        let status = HttpError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(classify(&status), ErrorKind::Api);

        let deadline = HttpError::Deadline { timeout_ms: 5_000 };
        assert_eq!(classify(&deadline), ErrorKind::Timeout);
    }

    #[test]
    fn test_credential_and_config_errors() {
        let missing = CredentialError::EnvVarMissing {
            var: "GEMINI_API_KEY".into(),
        };
        assert_eq!(classify(&missing), ErrorKind::Authentication);
        assert_eq!(
            classify(&std::env::VarError::NotPresent),
            ErrorKind::Authentication
        );

        let invalid = ConfigError::Invalid {
            message: "max_attempts must be at least 1".into(),
        };
        assert_eq!(classify(&invalid), ErrorKind::Configuration);
    }

    #[test]
    fn test_malformed_payload_is_data_corruption() {
        let err = serde_json::from_str::<Vec<String>>("{\"query\": 1}").unwrap_err();
        assert_eq!(classify(&err), ErrorKind::DataCorruption);
    }

    #[test]
    fn test_io_errors() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(classify(&refused), ErrorKind::Network);

        let other = std::io::Error::other("disk on fire");
        assert_eq!(classify(&other), ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_elapsed_is_timeout() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert_eq!(classify(&elapsed), ErrorKind::Timeout);
    }

    #[test]
    fn test_unknown_falls_through() {
        #[derive(Debug)]
        struct Opaque;
        impl std::fmt::Display for Opaque {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "opaque")
            }
        }
        impl StdError for Opaque {}

        assert_eq!(classify(&Opaque), ErrorKind::Unknown);
    }

    #[test]
    fn test_source_chain_is_walked() {
        let agent = AgentError::new("wrapped", ErrorKind::Unknown).with_cause(HttpError::Closed);
        // The outer AgentError is known, so its own kind wins over the cause.
        assert_eq!(classify(&agent), ErrorKind::Unknown);

        let sleuth = SleuthError::Http(HttpError::Status {
            status: 429,
            body: String::new(),
        });
        assert_eq!(classify(&sleuth), ErrorKind::Api);
    }

    #[test]
    fn test_classify_is_pure() {
        let a = HttpError::Status {
            status: 500,
            body: "x".into(),
        };
        let b = a.clone();
        assert_eq!(classify(&a), classify(&b));
        assert_eq!(classify(&a), classify(&a));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ErrorKind::Network.to_string(), "NETWORK_ERROR");
        assert_eq!(ErrorKind::DataCorruption.to_string(), "DATA_CORRUPTION_ERROR");
        assert_eq!(ErrorKind::Unknown.to_string(), "UNKNOWN_ERROR");
    }

    #[tokio::test]
    async fn test_guard_returns_fallback() {
        let value = Guard::new("query_generation")
            .quiet()
            .or_fallback(
                async { Err::<Vec<String>, _>(HttpError::Closed) },
                |err| vec![err.kind.to_string()],
            )
            .await;
        assert_eq!(value, vec!["CONFIGURATION_ERROR".to_string()]);
    }

    #[tokio::test]
    async fn test_guard_passes_success_through() {
        let value = Guard::new("reflection")
            .or_fallback(async { Ok::<_, HttpError>(7) }, |_| 0)
            .await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_guard_classified_reraises() {
        let err = Guard::new("finalize")
            .classified(async { Err::<(), _>(HttpError::Deadline { timeout_ms: 50 }) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("finalize failed"));
    }
}
