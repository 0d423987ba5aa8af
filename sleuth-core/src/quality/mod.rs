//! Source quality engine: credibility classification, composite scoring, and
//! graduated filtering.

pub mod credibility;
pub mod filter;
pub mod scoring;

pub use credibility::{
    CredibilityClassifier, CredibilityTier, DomainType, SourceCredibility, normalize_host,
};
pub use filter::{FilterOutcome, QualityFilter, QualitySummary, QualityThreshold, QualityTier};
pub use scoring::{QualityBreakdown, QualityScorer, ScoringInput};
