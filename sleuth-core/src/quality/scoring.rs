//! Composite quality scoring.
//!
//! Four sub-scores in [0, 1] are combined as a fixed weighted sum.

use super::credibility::CredibilityTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const CREDIBILITY_WEIGHT: f64 = 0.30;
pub const RELEVANCE_WEIGHT: f64 = 0.30;
pub const COMPLETENESS_WEIGHT: f64 = 0.25;
pub const RECENCY_WEIGHT: f64 = 0.15;

/// Score used when a signal is missing entirely.
const NEUTRAL: f64 = 0.5;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "his", "how", "its", "may", "new", "now", "see", "two", "who",
    "did", "get", "she", "too", "use", "that", "with", "have", "this", "will", "your", "from",
    "they", "been", "were", "what", "when", "which", "their", "there", "about", "would", "these",
    "other", "into", "than", "then", "them", "does", "also", "more", "most", "some", "such",
];

/// The four sub-scores of one source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub source_credibility: f64,
    pub content_relevance: f64,
    pub information_completeness: f64,
    pub recency: f64,
}

impl QualityBreakdown {
    /// Weighted composite, rounded to three decimals.
    pub fn overall(&self) -> f64 {
        let sum = CREDIBILITY_WEIGHT * self.source_credibility
            + RELEVANCE_WEIGHT * self.content_relevance
            + COMPLETENESS_WEIGHT * self.information_completeness
            + RECENCY_WEIGHT * self.recency;
        round3(sum.clamp(0.0, 1.0))
    }
}

/// Inputs the scorer looks at. Borrowed from a source so scoring never clones.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub credibility: CredibilityTier,
    pub title: &'a str,
    pub url: &'a str,
    pub snippet: &'a str,
    pub published_at: Option<DateTime<Utc>>,
}

/// Scores sources against the research query.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    query_terms: HashSet<String>,
    now: DateTime<Utc>,
}

impl QualityScorer {
    pub fn new(query: &str) -> Self {
        Self::at(query, Utc::now())
    }

    /// Scorer with a fixed reference time for recency.
    pub fn at(query: &str, now: DateTime<Utc>) -> Self {
        Self {
            query_terms: terms(query),
            now,
        }
    }

    pub fn score(&self, input: &ScoringInput<'_>) -> QualityBreakdown {
        QualityBreakdown {
            source_credibility: input.credibility.score(),
            content_relevance: self.relevance(input.title, input.snippet),
            information_completeness: completeness(input.title, input.url, input.snippet),
            recency: recency(input.published_at, self.now),
        }
    }

    /// Fraction of query terms that appear in the title or snippet.
    fn relevance(&self, title: &str, snippet: &str) -> f64 {
        if self.query_terms.is_empty() {
            return NEUTRAL;
        }
        let content = terms(&format!("{title} {snippet}"));
        if content.is_empty() {
            return 0.0;
        }
        let hits = self
            .query_terms
            .iter()
            .filter(|term| content.contains(*term))
            .count();
        round3(hits as f64 / self.query_terms.len() as f64)
    }
}

fn completeness(title: &str, url: &str, snippet: &str) -> f64 {
    let mut score: f64 = 0.0;
    if !title.trim().is_empty() {
        score += 0.2;
    }
    if !url.trim().is_empty() {
        score += 0.1;
    }
    score += match snippet.split_whitespace().count() {
        n if n >= 150 => 0.7,
        n if n >= 60 => 0.55,
        n if n >= 25 => 0.4,
        n if n >= 8 => 0.25,
        0 => 0.0,
        _ => 0.1,
    };
    round3(score.min(1.0))
}

fn recency(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(published) = published_at else {
        return NEUTRAL;
    };
    match (now - published).num_days() {
        d if d <= 30 => 1.0,
        d if d <= 180 => 0.85,
        d if d <= 365 => 0.7,
        d if d <= 3 * 365 => 0.5,
        _ => 0.3,
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn input<'a>(tier: CredibilityTier, title: &'a str, snippet: &'a str) -> ScoringInput<'a> {
        ScoringInput {
            credibility: tier,
            title,
            url: "https://example.com",
            snippet,
            published_at: None,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total = CREDIBILITY_WEIGHT + RELEVANCE_WEIGHT + COMPLETENESS_WEIGHT + RECENCY_WEIGHT;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_overall_is_weighted_sum() {
        let breakdown = QualityBreakdown {
            source_credibility: 1.0,
            content_relevance: 0.5,
            information_completeness: 0.4,
            recency: 0.5,
        };
        // 0.30 + 0.15 + 0.10 + 0.075
        assert_eq!(breakdown.overall(), 0.625);
    }

    #[test]
    fn test_relevance_counts_term_overlap() {
        let scorer = QualityScorer::new("quantum error correction");
        let score = scorer.score(&input(
            CredibilityTier::High,
            "Quantum computing advances",
            "New results in error correction codes",
        ));
        assert_eq!(score.content_relevance, 1.0);

        let partial = scorer.score(&input(CredibilityTier::High, "Quantum dots", ""));
        assert_eq!(partial.content_relevance, 0.333);
    }

    #[test]
    fn test_relevance_neutral_for_empty_query() {
        let scorer = QualityScorer::new("the and");
        let score = scorer.score(&input(CredibilityTier::Low, "anything", "at all"));
        assert_eq!(score.content_relevance, 0.5);
    }

    #[test]
    fn test_completeness_tiers() {
        assert_eq!(completeness("", "", ""), 0.0);
        assert_eq!(completeness("Title", "https://x.org", ""), 0.3);
        let long = "word ".repeat(200);
        assert_eq!(completeness("Title", "https://x.org", &long), 1.0);
        let medium = "word ".repeat(30);
        assert_eq!(completeness("Title", "", &medium), 0.6);
    }

    #[test]
    fn test_recency_buckets() {
        let now = Utc::now();
        assert_eq!(recency(None, now), 0.5);
        assert_eq!(recency(Some(now - Duration::days(3)), now), 1.0);
        assert_eq!(recency(Some(now - Duration::days(90)), now), 0.85);
        assert_eq!(recency(Some(now - Duration::days(300)), now), 0.7);
        assert_eq!(recency(Some(now - Duration::days(800)), now), 0.5);
        assert_eq!(recency(Some(now - Duration::days(4000)), now), 0.3);
        // Future dates count as fresh.
        assert_eq!(recency(Some(now + Duration::days(2)), now), 1.0);
    }

    #[test]
    fn test_credibility_drives_score() {
        let scorer = QualityScorer::new("climate policy");
        let high = scorer.score(&input(CredibilityTier::High, "Climate policy", ""));
        let low = scorer.score(&input(CredibilityTier::Low, "Climate policy", ""));
        assert!(high.overall() > low.overall());
        assert_eq!(high.source_credibility, 1.0);
        assert_eq!(low.source_credibility, 0.3);
    }
}
