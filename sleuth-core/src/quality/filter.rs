//! Graduated source filtering.
//!
//! Every source is scored, then split into `included` (score at or above the
//! threshold) and `filtered`. Filtered sources are kept, best first, up to a
//! retain cap so callers can still show them.

use super::credibility::CredibilityClassifier;
use super::scoring::{QualityScorer, ScoringInput};
use crate::error::ConfigError;
use crate::research::Source;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Named quality tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Any,
    Medium,
    High,
}

impl QualityTier {
    pub fn threshold(self) -> f64 {
        match self {
            QualityTier::Any => 0.0,
            QualityTier::Medium => 0.6,
            QualityTier::High => 0.8,
        }
    }
}

/// Minimum overall score a source needs to be included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QualityThreshold {
    Tier(QualityTier),
    Custom(f64),
}

impl QualityThreshold {
    pub fn value(&self) -> f64 {
        match self {
            QualityThreshold::Tier(tier) => tier.threshold(),
            QualityThreshold::Custom(value) => *value,
        }
    }

    /// Reject values outside [0, 1], including NaN.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let value = self.value();
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: format!("quality threshold must be within [0, 1], got {value}"),
            })
        }
    }
}

impl Default for QualityThreshold {
    fn default() -> Self {
        QualityThreshold::Tier(QualityTier::Medium)
    }
}

impl From<QualityTier> for QualityThreshold {
    fn from(tier: QualityTier) -> Self {
        QualityThreshold::Tier(tier)
    }
}

impl fmt::Display for QualityThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityThreshold::Tier(QualityTier::Any) => write!(f, "any"),
            QualityThreshold::Tier(QualityTier::Medium) => write!(f, "medium"),
            QualityThreshold::Tier(QualityTier::High) => write!(f, "high"),
            QualityThreshold::Custom(value) => write!(f, "{value}"),
        }
    }
}

impl FromStr for QualityThreshold {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" => Ok(QualityTier::Any.into()),
            "medium" => Ok(QualityTier::Medium.into()),
            "high" => Ok(QualityTier::High.into()),
            other => match other.parse::<f64>() {
                Ok(value) if (0.0..=1.0).contains(&value) => Ok(QualityThreshold::Custom(value)),
                _ => Err(ConfigError::Invalid {
                    message: format!(
                        "quality threshold must be any, medium, high, or a number in [0, 1], got '{s}'"
                    ),
                }),
            },
        }
    }
}

/// Counts and mean score of one filtering pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub total_sources: usize,
    pub included_sources: usize,
    pub filtered_sources: usize,
    pub quality_threshold: f64,
    pub average_quality_score: f64,
}

/// Result of [`QualityFilter::apply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOutcome {
    /// Sources at or above the threshold, in input order.
    pub included: Vec<Source>,
    /// Best-scoring sources below the threshold, at most the retain cap.
    pub filtered: Vec<Source>,
    pub summary: QualitySummary,
}

/// Scores and partitions sources by a quality threshold.
pub struct QualityFilter {
    classifier: Arc<CredibilityClassifier>,
    retain_cap: usize,
}

impl QualityFilter {
    pub fn new(classifier: Arc<CredibilityClassifier>, retain_cap: usize) -> Self {
        Self {
            classifier,
            retain_cap,
        }
    }

    pub fn classifier(&self) -> &Arc<CredibilityClassifier> {
        &self.classifier
    }

    /// Score every source against `query` and split at `threshold`.
    ///
    /// Sources that already carry a score keep it.
    pub fn apply(
        &self,
        sources: Vec<Source>,
        query: &str,
        threshold: QualityThreshold,
    ) -> FilterOutcome {
        self.apply_with(&QualityScorer::new(query), sources, threshold)
    }

    /// Like [`apply`](Self::apply) with a caller-supplied scorer.
    pub fn apply_with(
        &self,
        scorer: &QualityScorer,
        sources: Vec<Source>,
        threshold: QualityThreshold,
    ) -> FilterOutcome {
        let cutoff = threshold.value();
        let total = sources.len();
        let mut included = Vec::new();
        let mut filtered = Vec::new();
        let mut score_sum = 0.0;

        for source in sources {
            let source = self.score(scorer, source);
            let score = source.quality_score.unwrap_or(0.0);
            score_sum += score;
            if score >= cutoff {
                included.push(source);
            } else {
                debug!(url = %source.url, score, cutoff, "Source below quality threshold");
                filtered.push(source);
            }
        }

        let filtered_count = filtered.len();
        filtered.sort_by(|a, b| {
            b.quality_score
                .unwrap_or(0.0)
                .total_cmp(&a.quality_score.unwrap_or(0.0))
        });
        filtered.truncate(self.retain_cap);

        let average = if total == 0 {
            0.0
        } else {
            (score_sum / total as f64 * 1000.0).round() / 1000.0
        };
        let summary = QualitySummary {
            total_sources: total,
            included_sources: included.len(),
            filtered_sources: filtered_count,
            quality_threshold: cutoff,
            average_quality_score: average,
        };

        info!(
            total = summary.total_sources,
            included = summary.included_sources,
            filtered = summary.filtered_sources,
            threshold = cutoff,
            average = summary.average_quality_score,
            "Quality filter applied"
        );

        FilterOutcome {
            included,
            filtered,
            summary,
        }
    }

    fn score(&self, scorer: &QualityScorer, source: Source) -> Source {
        if source.is_scored() {
            return source;
        }
        let credibility = self.classifier.classify_source(&source.url);
        let breakdown = scorer.score(&ScoringInput {
            credibility: credibility.credibility,
            title: &source.title,
            url: &source.url,
            snippet: &source.snippet,
            published_at: source.published_at,
        });
        source.scored(credibility, breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn filter() -> QualityFilter {
        QualityFilter::new(Arc::new(CredibilityClassifier::new(64)), 5)
    }

    fn sample_sources() -> Vec<Source> {
        vec![
            Source::new(
                "Quantum error correction reaches a new milestone",
                "https://www.nature.com/articles/quantum-error-correction",
            )
            .with_snippet(
                "Researchers demonstrate quantum error correction below the surface code \
                 threshold using a superconducting processor with logical qubits.",
            ),
            Source::new(
                "Google says its quantum chip corrects errors",
                "https://www.reuters.com/technology/quantum-chip",
            )
            .with_snippet(
                "The quantum processor reduced error rates as more qubits were added, \
                 a key step toward practical error correction, the company said.",
            ),
            Source::new("my thoughts", "https://random-blog.info/post/42")
                .with_snippet("i like computers"),
        ]
    }

    #[test]
    fn test_medium_threshold_keeps_credible_sources() {
        let outcome = filter().apply(
            sample_sources(),
            "quantum error correction",
            QualityTier::Medium.into(),
        );

        let included: Vec<&str> = outcome.included.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            included,
            vec![
                "https://www.nature.com/articles/quantum-error-correction",
                "https://www.reuters.com/technology/quantum-chip",
            ]
        );
        assert_eq!(outcome.filtered.len(), 1);
        assert_eq!(outcome.filtered[0].url, "https://random-blog.info/post/42");
        assert_eq!(outcome.summary.total_sources, 3);
        assert_eq!(
            outcome.summary.included_sources + outcome.summary.filtered_sources,
            3
        );
        assert_eq!(outcome.summary.quality_threshold, 0.6);
    }

    #[test]
    fn test_empty_input() {
        let outcome = filter().apply(Vec::new(), "anything", QualityTier::High.into());
        assert!(outcome.included.is_empty());
        assert!(outcome.filtered.is_empty());
        assert_eq!(
            outcome.summary,
            QualitySummary {
                total_sources: 0,
                included_sources: 0,
                filtered_sources: 0,
                quality_threshold: 0.8,
                average_quality_score: 0.0,
            }
        );
    }

    #[test]
    fn test_any_includes_everything() {
        let outcome = filter().apply(sample_sources(), "quantum", QualityTier::Any.into());
        assert_eq!(outcome.included.len(), 3);
        assert_eq!(outcome.summary.filtered_sources, 0);
    }

    #[test]
    fn test_higher_threshold_filters_at_least_as_many() {
        let f = filter();
        let mut previous = 0;
        for t in [0.0, 0.3, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0] {
            let outcome = f.apply(
                sample_sources(),
                "quantum error correction",
                QualityThreshold::Custom(t),
            );
            assert!(outcome.summary.filtered_sources >= previous);
            previous = outcome.summary.filtered_sources;
        }
    }

    #[test]
    fn test_retain_cap_keeps_best_filtered() {
        let f = QualityFilter::new(Arc::new(CredibilityClassifier::new(64)), 1);
        let outcome = f.apply(
            sample_sources(),
            "quantum error correction",
            QualityThreshold::Custom(1.0),
        );
        assert_eq!(outcome.summary.filtered_sources, 3);
        assert_eq!(outcome.filtered.len(), 1);
        assert!(outcome.filtered[0].url.contains("nature.com"));
    }

    #[test]
    fn test_sources_are_scored_once() {
        let f = filter();
        let first = f.apply(sample_sources(), "quantum", QualityTier::Any.into());
        let computed = f.classifier().computed_count();

        let again = f.apply(first.included.clone(), "something else", QualityTier::Any.into());
        assert_eq!(f.classifier().computed_count(), computed);
        assert_eq!(
            again.included[0].quality_score,
            first.included[0].quality_score
        );
    }

    #[test]
    fn test_threshold_range_check() {
        assert!(QualityThreshold::Custom(0.0).validate().is_ok());
        assert!(QualityThreshold::Custom(1.0).validate().is_ok());
        assert!(QualityThreshold::from(QualityTier::High).validate().is_ok());
        assert!(QualityThreshold::Custom(1.5).validate().is_err());
        assert!(QualityThreshold::Custom(-0.1).validate().is_err());
        assert!(QualityThreshold::Custom(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_threshold_parsing() {
        assert_eq!(
            "high".parse::<QualityThreshold>().unwrap(),
            QualityThreshold::Tier(QualityTier::High)
        );
        assert_eq!(
            " Medium ".parse::<QualityThreshold>().unwrap().value(),
            0.6
        );
        assert_eq!(
            "0.45".parse::<QualityThreshold>().unwrap(),
            QualityThreshold::Custom(0.45)
        );
        assert!("1.5".parse::<QualityThreshold>().is_err());
        assert!("strict".parse::<QualityThreshold>().is_err());
    }

    #[test]
    fn test_threshold_serde_forms() {
        let tier: QualityThreshold = serde_json::from_str("\"any\"").unwrap();
        assert_eq!(tier, QualityThreshold::Tier(QualityTier::Any));
        let custom: QualityThreshold = serde_json::from_str("0.7").unwrap();
        assert_eq!(custom, QualityThreshold::Custom(0.7));
        assert_eq!(
            serde_json::to_string(&QualityThreshold::default()).unwrap(),
            "\"medium\""
        );
    }
}
