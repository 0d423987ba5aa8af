//! Research sources gathered by the search stage.

use crate::quality::{QualityBreakdown, SourceCredibility};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A source of information discovered during research.
///
/// Quality fields are empty until the source passes through the quality
/// filter, which scores it exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    /// Resolved URL. Also the credibility cache key.
    pub url: String,
    /// Compact redirect URL cited in the generated text.
    #[serde(default)]
    pub short_url: String,
    /// Short human label, usually the site name.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Overall quality in [0, 1].
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub quality_breakdown: Option<QualityBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credibility: Option<SourceCredibility>,
}

impl Source {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            short_url: String::new(),
            label: String::new(),
            snippet: String::new(),
            published_at: None,
            quality_score: None,
            quality_breakdown: None,
            credibility: None,
        }
    }

    pub fn with_short_url(mut self, short_url: impl Into<String>) -> Self {
        self.short_url = short_url.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    pub fn is_scored(&self) -> bool {
        self.quality_score.is_some() && self.quality_breakdown.is_some()
    }

    /// Attach quality fields. A source that is already scored is returned as is.
    pub fn scored(mut self, credibility: SourceCredibility, breakdown: QualityBreakdown) -> Self {
        if self.is_scored() {
            return self;
        }
        self.quality_score = Some(breakdown.overall());
        self.quality_breakdown = Some(breakdown);
        self.credibility = Some(credibility);
        self
    }

    /// The label, falling back to the title.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.title
        } else {
            &self.label
        }
    }
}

/// Drop later sources whose URL was already seen, keeping first-seen order.
pub fn dedupe_by_url(sources: Vec<Source>) -> Vec<Source> {
    let mut seen = std::collections::HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert(s.url.clone()))
        .collect()
}

/// Characters that can continue a link, so a match followed by one is only a prefix.
fn continues_link(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '%')
}

/// Start offsets where `link` appears whole, not as the prefix of a longer link.
fn link_positions(text: &str, link: &str) -> Vec<usize> {
    if link.is_empty() {
        return Vec::new();
    }
    text.match_indices(link)
        .map(|(i, _)| i)
        .filter(|&i| {
            text[i + link.len()..]
                .chars()
                .next()
                .is_none_or(|c| !continues_link(c))
        })
        .collect()
}

/// Whether `text` cites `link` as a whole link.
pub fn cites_link(text: &str, link: &str) -> bool {
    !link_positions(text, link).is_empty()
}

/// Replace every whole occurrence of `link` in `text` with `replacement`.
pub fn replace_link(text: &str, link: &str, replacement: &str) -> String {
    let positions = link_positions(text, link);
    if positions.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for i in positions {
        out.push_str(&text[last..i]);
        out.push_str(replacement);
        last = i + link.len();
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{CredibilityTier, DomainType};

    fn breakdown() -> QualityBreakdown {
        QualityBreakdown {
            source_credibility: 1.0,
            content_relevance: 1.0,
            information_completeness: 1.0,
            recency: 1.0,
        }
    }

    fn credibility() -> SourceCredibility {
        SourceCredibility {
            domain: "nature.com".into(),
            credibility: CredibilityTier::High,
            domain_type: DomainType::Academic,
        }
    }

    #[test]
    fn test_source_unscored_by_default() {
        let source = Source::new("Paper", "https://nature.com/x");
        assert!(!source.is_scored());
        assert_eq!(source.quality_score, None);
        assert_eq!(source.display_label(), "Paper");
    }

    #[test]
    fn test_scored_once() {
        let source = Source::new("Paper", "https://nature.com/x").scored(credibility(), breakdown());
        assert_eq!(source.quality_score, Some(1.0));

        let mut worse = breakdown();
        worse.source_credibility = 0.0;
        let rescored = source.clone().scored(credibility(), worse);
        assert_eq!(rescored, source);
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let sources = vec![
            Source::new("A", "https://a.com").with_label("first"),
            Source::new("B", "https://b.com"),
            Source::new("A again", "https://a.com").with_label("second"),
        ];
        let deduped = dedupe_by_url(sources);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].label, "first");
    }

    #[test]
    fn test_serde_defaults() {
        let source: Source =
            serde_json::from_str(r#"{"title": "T", "url": "https://t.org"}"#).unwrap();
        assert!(source.short_url.is_empty());
        assert!(!source.is_scored());
    }

    #[test]
    fn test_link_prefix_is_not_a_citation() {
        let text = "See [ten](https://vertexaisearch.cloud.google.com/id/1-10).";
        assert!(!cites_link(text, "https://vertexaisearch.cloud.google.com/id/1-1"));
        assert!(cites_link(text, "https://vertexaisearch.cloud.google.com/id/1-10"));
        assert!(!cites_link(text, ""));
    }

    #[test]
    fn test_replace_link_leaves_longer_links_alone() {
        let text = "See [one](https://vertexaisearch.cloud.google.com/id/1-1) and \
                    [ten](https://vertexaisearch.cloud.google.com/id/1-10).";
        let once = replace_link(
            text,
            "https://vertexaisearch.cloud.google.com/id/1-1",
            "https://one.org/a",
        );
        assert_eq!(
            once,
            "See [one](https://one.org/a) and \
             [ten](https://vertexaisearch.cloud.google.com/id/1-10)."
        );
        let both = replace_link(
            &once,
            "https://vertexaisearch.cloud.google.com/id/1-10",
            "https://ten.org/b",
        );
        assert_eq!(both, "See [one](https://one.org/a) and [ten](https://ten.org/b).");
    }
}
