//! Plain-text rendering of a research outcome.

use sleuth_core::research::{ResearchOutcome, Source, StopReason};
use std::fmt::Write;

fn stop_reason_text(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Sufficient => "evidence judged sufficient",
        StopReason::LoopBudgetExhausted => "loop budget exhausted",
        StopReason::NoFollowUpQueries => "no follow-up queries proposed",
    }
}

fn source_line(out: &mut String, index: usize, source: &Source) {
    let score = source
        .quality_score
        .map(|s| format!("{s:.2}"))
        .unwrap_or_else(|| "-".to_string());
    let tier = source
        .credibility
        .as_ref()
        .map(|c| format!("{:?}", c.credibility).to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());
    let _ = writeln!(
        out,
        "  [{index}] {} ({score}, {tier})\n      {}",
        source.display_label(),
        source.url
    );
}

/// Render the answer, its sources, and the quality summary.
pub fn render_outcome(outcome: &ResearchOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\n", outcome.final_answer.trim());

    if !outcome.sources.is_empty() {
        let _ = writeln!(out, "Sources:");
        for (i, source) in outcome.sources.iter().enumerate() {
            source_line(&mut out, i + 1, source);
        }
        out.push('\n');
    }

    if !outcome.filtered_sources.is_empty() {
        let _ = writeln!(out, "Below threshold:");
        for (i, source) in outcome.filtered_sources.iter().enumerate() {
            source_line(&mut out, i + 1, source);
        }
        out.push('\n');
    }

    let summary = &outcome.quality_summary;
    let _ = writeln!(
        out,
        "{} of {} sources passed the {:.2} threshold (average quality {:.2}).",
        summary.included_sources,
        summary.total_sources,
        summary.quality_threshold,
        summary.average_quality_score
    );
    let _ = writeln!(
        out,
        "{} queries, {} follow-up loops, stopped: {}.",
        outcome.total_queries,
        outcome.research_loops_executed,
        stop_reason_text(outcome.stop_reason)
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sleuth_core::QualitySummary;
    use uuid::Uuid;

    fn outcome(sources: Vec<Source>, filtered: Vec<Source>) -> ResearchOutcome {
        ResearchOutcome {
            request_id: Uuid::nil(),
            final_answer: "Heat pumps work well in cold climates.\n".to_string(),
            quality_summary: QualitySummary {
                total_sources: sources.len() + filtered.len(),
                included_sources: sources.len(),
                filtered_sources: filtered.len(),
                quality_threshold: 0.6,
                average_quality_score: 0.7,
            },
            sources,
            filtered_sources: filtered,
            research_loops_executed: 1,
            total_queries: 4,
            stop_reason: StopReason::Sufficient,
            stages: Vec::new(),
            messages: Vec::new(),
        }
    }

    #[test]
    fn test_render_lists_sources_and_summary() {
        let mut source = Source::new("Cold climate study", "https://www.nrel.gov/heat-pumps")
            .with_label("nrel");
        source.quality_score = Some(0.81);
        let text = render_outcome(&outcome(vec![source], Vec::new()));

        assert!(text.starts_with("Heat pumps work well in cold climates.\n\nSources:\n"));
        assert!(text.contains("[1] nrel (0.81, unknown)"));
        assert!(text.contains("https://www.nrel.gov/heat-pumps"));
        assert!(!text.contains("Below threshold"));
        assert!(text.contains("1 of 1 sources passed the 0.60 threshold"));
        assert!(text.contains("stopped: evidence judged sufficient."));
    }

    #[test]
    fn test_render_shows_filtered_sources() {
        let filtered = Source::new("my weekend", "https://random-blog.info/weekend");
        let text = render_outcome(&outcome(Vec::new(), vec![filtered]));

        assert!(!text.contains("Sources:"));
        assert!(text.contains("Below threshold:\n  [1] my weekend (-, unknown)"));
        assert_eq!(text.lines().last(), Some("4 queries, 1 follow-up loops, stopped: evidence judged sufficient."));
    }
}
