//! Configuration system for Sleuth.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment.
//! Configuration is loaded from `~/.config/sleuth/config.toml` and/or `.sleuth/config.toml`
//! in the workspace directory. The loaded value is validated once and then shared
//! read-only for the life of the process.

use crate::classify::ErrorKind;
use crate::error::ConfigError;
use crate::quality::QualityThreshold;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for the research engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleuthConfig {
    pub http: HttpConfig,
    pub retry: RetryConfig,
    pub research: ResearchConfig,
    pub llm: LlmConfig,
}

impl SleuthConfig {
    /// Check every section and return the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.validate()?;
        self.retry.validate()?;
        self.research.validate()?;
        self.llm.validate()
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

/// Settings for the shared HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum number of requests in flight across the whole process.
    pub max_connections: usize,
    /// Maximum idle keep-alive connections kept per host.
    pub max_keepalive_connections: usize,
    /// Seconds an idle connection is kept before it is closed.
    pub keepalive_expiry_secs: u64,
    /// Verify TLS certificates.
    pub verify_tls: bool,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_connections: 100,
            max_keepalive_connections: 20,
            keepalive_expiry_secs: 30,
            verify_tls: true,
            user_agent: concat!("sleuth/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn keepalive_expiry(&self) -> Duration {
        Duration::from_secs(self.keepalive_expiry_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(invalid("http.timeout_secs must be greater than 0"));
        }
        if self.max_connections == 0 {
            return Err(invalid("http.max_connections must be greater than 0"));
        }
        if self.max_keepalive_connections > self.max_connections {
            return Err(invalid(
                "http.max_keepalive_connections cannot exceed http.max_connections",
            ));
        }
        Ok(())
    }
}

/// Retry policy for transient failures.
///
/// `max_attempts` counts every call, including the first. The wait before
/// attempt `i + 1` is `base_delay_ms * 2^(i - 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Error kinds that are retried; everything else fails fast.
    pub retriable: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            retriable: ErrorKind::RETRIABLE.to_vec(),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            ..Default::default()
        }
    }

    /// The wait after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exponent))
    }

    pub fn is_retriable(&self, kind: ErrorKind) -> bool {
        self.retriable.contains(&kind)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.base_delay_ms == 0 {
            return Err(invalid("retry.base_delay_ms must be greater than 0"));
        }
        Ok(())
    }
}

/// Defaults for research runs and the quality engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub initial_search_query_count: usize,
    pub max_research_loops: usize,
    /// Either a named tier (`any`, `medium`, `high`) or a number in [0, 1].
    pub quality_threshold: QualityThreshold,
    /// How many filtered-out sources are retained for display.
    pub filtered_retain_cap: usize,
    /// Capacity of the per-URL credibility cache.
    pub credibility_cache_capacity: usize,
    /// Worker pool size; derived from the CPU count when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_pool_size: Option<usize>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            initial_search_query_count: 3,
            max_research_loops: 2,
            quality_threshold: QualityThreshold::default(),
            filtered_retain_cap: 5,
            credibility_cache_capacity: 1024,
            worker_pool_size: None,
        }
    }
}

impl ResearchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.quality_threshold.validate()?;
        if self.credibility_cache_capacity == 0 {
            return Err(invalid(
                "research.credibility_cache_capacity must be greater than 0",
            ));
        }
        if self.worker_pool_size == Some(0) {
            return Err(invalid("research.worker_pool_size must be greater than 0"));
        }
        Ok(())
    }
}

/// Settings for the Gemini-backed collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API base URL; defaults to the public Gemini endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Inline API key. Prefer `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub query_model: String,
    pub search_model: String,
    pub reflection_model: String,
    pub answer_model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            api_key: None,
            query_model: "gemini-2.0-flash".to_string(),
            search_model: "gemini-2.0-flash".to_string(),
            reflection_model: "gemini-2.5-flash".to_string(),
            answer_model: "gemini-2.5-pro".to_string(),
            temperature: 0.7,
        }
    }
}

impl LlmConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key_env.trim().is_empty() && self.api_key.is_none() {
            return Err(ConfigError::MissingField {
                field: "llm.api_key_env".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid(format!(
                "llm.temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// Load configuration from layered sources and validate it.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `SLEUTH_`, `__` separates sections)
/// 2. Workspace-local config (`.sleuth/config.toml`)
/// 3. User config (`~/.config/sleuth/config.toml`)
/// 4. Built-in defaults
pub fn load_config(workspace: Option<&Path>) -> Result<SleuthConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(SleuthConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "sleuth", "sleuth") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".sleuth").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SLEUTH_RESEARCH__MAX_RESEARCH_LOOPS, SLEUTH_HTTP__TIMEOUT_SECS, etc.
    figment = figment.merge(Env::prefixed("SLEUTH_").split("__"));

    let config: SleuthConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
