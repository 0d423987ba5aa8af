//! # Sleuth Core
//!
//! Core library for the Sleuth research engine.
//! Provides the research pipeline controller, the bounded search fan-out,
//! the shared retrying HTTP client, error classification, source quality
//! scoring, configuration, and the Gemini-backed collaborators.

pub mod classify;
pub mod config;
pub mod error;
pub mod http;
pub mod providers;
pub mod quality;
pub mod research;
pub mod runtime;

// Re-export commonly used types at the crate root.
pub use classify::{ErrorKind, Guard, classify};
pub use config::{HttpConfig, LlmConfig, ResearchConfig, RetryConfig, SleuthConfig, load_config};
pub use error::{AgentError, ConfigError, CredentialError, HttpError, Result, SleuthError};
pub use http::{HttpClient, HttpRequest, HttpResponse, with_retry};
pub use providers::build_collaborators;
pub use quality::{
    CredibilityClassifier, CredibilityTier, DomainType, QualityFilter, QualitySummary,
    QualityThreshold, QualityTier,
};
pub use research::{
    Collaborators, ResearchCallback, ResearchController, ResearchOutcome, ResearchPhase,
    ResearchRequest, ResearchService, Source, StopReason,
};
pub use runtime::{ResourceContext, WorkerPool, default_pool_size};
