use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sleuth_core::quality::{
    CredibilityClassifier, QualityFilter, QualityScorer, QualityTier, ScoringInput,
    normalize_host,
};
use sleuth_core::research::Source;
use std::sync::Arc;

fn sample_sources(n: usize) -> Vec<Source> {
    let hosts = [
        "www.nature.com",
        "reuters.com",
        "random-blog.info",
        "cdc.gov",
        "en.wikipedia.org",
        "shop.example.com",
    ];
    (0..n)
        .map(|i| {
            let host = hosts[i % hosts.len()];
            Source::new(
                format!("Battery chemistry report {i}"),
                format!("https://{host}/articles/{i}"),
            )
            .with_snippet("Solid state battery chemistry improves energy density and safety. ".repeat(6))
        })
        .collect()
}

fn bench_credibility(c: &mut Criterion) {
    c.bench_function("normalize_host", |b| {
        b.iter(|| normalize_host(black_box("https://WWW.Nature.com/articles/s41586-024")))
    });

    let classifier = CredibilityClassifier::new(1024);
    classifier.classify_source("https://www.nature.com/articles/cached");
    c.bench_function("classify_source_cached", |b| {
        b.iter(|| classifier.classify_source(black_box("https://www.nature.com/articles/cached")))
    });

    let mut i = 0usize;
    let cold = CredibilityClassifier::new(16);
    c.bench_function("classify_source_uncached", |b| {
        b.iter(|| {
            i += 1;
            cold.classify_source(&format!("https://site{i}.example.org/page"))
        })
    });
}

fn bench_scoring(c: &mut Criterion) {
    let scorer = QualityScorer::new("solid state battery energy density");
    let snippet = "Solid state battery chemistry improves energy density and safety. ".repeat(6);
    c.bench_function("score_source", |b| {
        b.iter(|| {
            scorer.score(black_box(&ScoringInput {
                credibility: sleuth_core::CredibilityTier::High,
                title: "Battery chemistry report",
                url: "https://www.nature.com/articles/1",
                snippet: &snippet,
                published_at: None,
            }))
        })
    });
}

fn bench_filter(c: &mut Criterion) {
    let filter = QualityFilter::new(Arc::new(CredibilityClassifier::new(1024)), 5);
    let sources = sample_sources(50);
    c.bench_function("filter_50_sources", |b| {
        b.iter(|| {
            filter.apply(
                black_box(sources.clone()),
                "solid state battery energy density",
                QualityTier::Medium.into(),
            )
        })
    });
}

criterion_group!(benches, bench_credibility, bench_scoring, bench_filter);
criterion_main!(benches);
