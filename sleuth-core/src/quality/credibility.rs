//! URL-based source credibility classification with a bounded cache.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Coarse trust bucket for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredibilityTier {
    Low,
    Medium,
    High,
}

impl CredibilityTier {
    /// Sub-score contributed to the composite quality score.
    pub fn score(self) -> f64 {
        match self {
            CredibilityTier::High => 1.0,
            CredibilityTier::Medium => 0.6,
            CredibilityTier::Low => 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainType {
    Academic,
    Official,
    News,
    Commercial,
    Other,
}

/// Result of classifying one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCredibility {
    /// Normalized host: lowercase, without a leading `www.`.
    pub domain: String,
    pub credibility: CredibilityTier,
    pub domain_type: DomainType,
}

use CredibilityTier::{High, Low, Medium};
use DomainType::{Academic, Commercial, News, Official, Other};

/// Named institutions, matched on the exact host or any subdomain of it.
const INSTITUTIONS: &[(&str, CredibilityTier, DomainType)] = &[
    // Journals, publishers, and indexes
    ("nature.com", High, Academic),
    ("science.org", High, Academic),
    ("sciencemag.org", High, Academic),
    ("cell.com", High, Academic),
    ("thelancet.com", High, Academic),
    ("nejm.org", High, Academic),
    ("bmj.com", High, Academic),
    ("pnas.org", High, Academic),
    ("plos.org", High, Academic),
    ("arxiv.org", High, Academic),
    ("springer.com", High, Academic),
    ("sciencedirect.com", High, Academic),
    ("wiley.com", High, Academic),
    ("jstor.org", High, Academic),
    ("ieee.org", High, Academic),
    ("acm.org", High, Academic),
    ("semanticscholar.org", High, Academic),
    ("scholar.google.com", High, Academic),
    ("researchgate.net", Medium, Academic),
    // International and public bodies outside .gov/.int
    ("europa.eu", High, Official),
    ("un.org", High, Official),
    ("worldbank.org", High, Official),
    ("imf.org", High, Official),
    ("oecd.org", High, Official),
    // News organizations
    ("reuters.com", High, News),
    ("apnews.com", High, News),
    ("bbc.com", High, News),
    ("bbc.co.uk", High, News),
    ("npr.org", High, News),
    ("economist.com", High, News),
    ("ft.com", High, News),
    ("wsj.com", High, News),
    ("nytimes.com", High, News),
    ("washingtonpost.com", High, News),
    ("theguardian.com", High, News),
    ("bloomberg.com", High, News),
    ("cnn.com", Medium, News),
    ("forbes.com", Medium, News),
    ("axios.com", Medium, News),
    ("politico.com", Medium, News),
    ("theverge.com", Medium, News),
    ("wired.com", Medium, News),
    ("arstechnica.com", Medium, News),
    ("techcrunch.com", Medium, News),
    // Reference and community sites
    ("wikipedia.org", Medium, Other),
    ("britannica.com", Medium, Other),
    ("github.com", Medium, Other),
    ("stackoverflow.com", Medium, Other),
    ("developer.mozilla.org", Medium, Other),
    ("reddit.com", Low, Other),
    ("quora.com", Low, Other),
    ("medium.com", Low, Commercial),
    ("substack.com", Low, Commercial),
    ("blogspot.com", Low, Commercial),
    ("wordpress.com", Low, Commercial),
];

/// Host suffixes, checked in order after the named institutions.
const SUFFIXES: &[(&str, CredibilityTier, DomainType)] = &[
    (".gov", High, Official),
    (".mil", High, Official),
    (".int", High, Official),
    (".gov.uk", High, Official),
    (".gov.au", High, Official),
    (".gc.ca", High, Official),
    (".edu", High, Academic),
    (".ac.uk", High, Academic),
    (".edu.au", High, Academic),
    (".ac.jp", High, Academic),
    (".ac.in", High, Academic),
    (".ac.nz", High, Academic),
    (".ac.za", High, Academic),
    (".edu.cn", High, Academic),
    (".org", Medium, Other),
];

/// Top-level domains treated as commercial when nothing more specific matched.
const COMMERCIAL_TLDS: &[&str] = &[".com", ".net", ".biz", ".co", ".io", ".shop", ".store"];

/// Lowercase the URL's host and strip a leading `www.`.
///
/// Accepts bare hosts (`example.com/path`) as well as full URLs.
pub fn normalize_host(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| url::Url::parse(&format!("https://{trimmed}")).ok())?;
    let host = parsed.host_str()?.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() { None } else { Some(host) }
}

fn matches_domain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Apply the ordered rule sets to a normalized host.
pub fn classify_host(host: &str) -> (CredibilityTier, DomainType) {
    if let Some((_, tier, kind)) = INSTITUTIONS
        .iter()
        .find(|(domain, _, _)| matches_domain(host, domain))
    {
        return (*tier, *kind);
    }
    if let Some((_, tier, kind)) = SUFFIXES.iter().find(|(suffix, _, _)| {
        host.ends_with(suffix) || host == suffix.trim_start_matches('.')
    }) {
        return (*tier, *kind);
    }
    if host.split('.').any(|label| label.contains("news")) {
        return (Medium, News);
    }
    if COMMERCIAL_TLDS.iter().any(|tld| host.ends_with(tld)) {
        return (Low, Commercial);
    }
    (Low, Other)
}

/// Classifies URLs and memoizes the result per URL in a bounded LRU cache.
pub struct CredibilityClassifier {
    cache: Mutex<LruCache<String, SourceCredibility>>,
    computed: AtomicUsize,
}

impl CredibilityClassifier {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            computed: AtomicUsize::new(0),
        }
    }

    /// Classify the URL, serving repeat lookups from the cache.
    pub fn classify_source(&self, url: &str) -> SourceCredibility {
        if let Some(hit) = self.lock_cache().get(url) {
            trace!(url, "Credibility cache hit");
            return hit.clone();
        }

        let result = Self::compute(url);
        self.computed.fetch_add(1, Ordering::Relaxed);
        self.lock_cache().put(url.to_string(), result.clone());
        result
    }

    fn compute(url: &str) -> SourceCredibility {
        match normalize_host(url) {
            Some(domain) => {
                let (credibility, domain_type) = classify_host(&domain);
                SourceCredibility {
                    domain,
                    credibility,
                    domain_type,
                }
            }
            None => SourceCredibility {
                domain: String::new(),
                credibility: Low,
                domain_type: Other,
            },
        }
    }

    /// Number of classifications computed rather than served from the cache.
    pub fn computed_count(&self) -> usize {
        self.computed.load(Ordering::Relaxed)
    }

    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn capacity(&self) -> usize {
        self.lock_cache().cap().get()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<String, SourceCredibility>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CredibilityClassifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("https://WWW.Nature.com/articles/x").as_deref(),
            Some("nature.com")
        );
        assert_eq!(
            normalize_host("reuters.com/world").as_deref(),
            Some("reuters.com")
        );
        assert_eq!(normalize_host("   ").as_deref(), None);
    }

    #[test]
    fn test_named_institutions_and_subdomains() {
        assert_eq!(classify_host("nature.com"), (High, Academic));
        assert_eq!(classify_host("link.springer.com"), (High, Academic));
        assert_eq!(classify_host("en.wikipedia.org"), (Medium, Other));
        assert_eq!(classify_host("reuters.com"), (High, News));
        // A look-alike host must not match by plain suffix.
        assert_ne!(classify_host("notnature.com"), (High, Academic));
    }

    #[test]
    fn test_suffix_rules() {
        assert_eq!(classify_host("cdc.gov"), (High, Official));
        assert_eq!(classify_host("who.int"), (High, Official));
        assert_eq!(classify_host("ox.ac.uk"), (High, Academic));
        assert_eq!(classify_host("cs.stanford.edu"), (High, Academic));
        assert_eq!(classify_host("example.org"), (Medium, Other));
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(classify_host("acme-widgets.com"), (Low, Commercial));
        assert_eq!(classify_host("localnews.net"), (Medium, News));
        assert_eq!(classify_host("random-blog.info"), (Low, Other));
    }

    #[test]
    fn test_cache_serves_repeat_lookups() {
        let classifier = CredibilityClassifier::new(16);
        let first = classifier.classify_source("https://www.nature.com/articles/s41586");
        let second = classifier.classify_source("https://www.nature.com/articles/s41586");

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(classifier.computed_count(), 1);
        assert_eq!(first.domain, "nature.com");
    }

    #[test]
    fn test_cache_is_bounded() {
        let classifier = CredibilityClassifier::new(2);
        classifier.classify_source("https://a.com");
        classifier.classify_source("https://b.com");
        classifier.classify_source("https://c.com");
        assert_eq!(classifier.cached_len(), 2);

        // a.com was evicted, so it is recomputed.
        classifier.classify_source("https://a.com");
        assert_eq!(classifier.computed_count(), 4);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let classifier = CredibilityClassifier::new(0);
        assert_eq!(classifier.capacity(), 1);
    }

    #[test]
    fn test_unparseable_url_is_low_other() {
        let classifier = CredibilityClassifier::default();
        let result = classifier.classify_source("");
        assert_eq!(result.credibility, Low);
        assert_eq!(result.domain_type, Other);
        assert!(result.domain.is_empty());
    }
}
