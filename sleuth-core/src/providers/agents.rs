//! Gemini-backed research collaborators.
//!
//! Query generation, reflection, and finalization catch every failure through
//! a [`Guard`] and return their deterministic fallback. The searcher reports
//! classified errors so the fan-out can isolate them.

use super::gemini::{GeminiClient, GroundedResponse, GroundingSupport};
use crate::classify::Guard;
use crate::config::SleuthConfig;
use crate::error::{AgentError, CredentialError};
use crate::http::HttpClient;
use crate::research::{
    Citation, Collaborators, FinalAnswer, Finalizer, QueryGenerator, QueryPlan, Reflection,
    Reflector, SearchOutput, Source, WebSearcher, cites_link,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const SHORT_URL_PREFIX: &str = "https://vertexaisearch.cloud.google.com/id";

/// Compact, stable URL for source `index` of query `query_id`.
pub fn short_url(query_id: usize, index: usize) -> String {
    format!("{SHORT_URL_PREFIX}/{query_id}-{index}")
}

/// Site name from a grounding title such as `nature.com`.
pub fn label_from_title(title: &str) -> String {
    let title = title.trim();
    let host = title.strip_prefix("www.").unwrap_or(title);
    match host.split_once('.') {
        Some((name, _)) if !name.is_empty() => name.to_string(),
        _ => host.to_string(),
    }
}

/// Build all four collaborators on one Gemini client.
pub fn build_collaborators(
    config: &SleuthConfig,
    http: Arc<HttpClient>,
) -> Result<Collaborators, CredentialError> {
    let client = Arc::new(GeminiClient::new(&config.llm, config.retry.clone(), http)?);
    let llm = &config.llm;
    Ok(Collaborators {
        query_generator: Arc::new(GeminiQueryGenerator::new(client.clone(), &llm.query_model)),
        searcher: Arc::new(GeminiSearcher::new(client.clone(), &llm.search_model)),
        reflector: Arc::new(GeminiReflector::new(client.clone(), &llm.reflection_model)),
        finalizer: Arc::new(GeminiFinalizer::new(client, &llm.answer_model)),
    })
}

// --- Query generation ---

#[derive(Debug, Deserialize)]
struct QueryListPayload {
    query: Vec<String>,
    #[serde(default)]
    rationale: String,
}

pub struct GeminiQueryGenerator {
    client: Arc<GeminiClient>,
    model: String,
}

impl GeminiQueryGenerator {
    pub fn new(client: Arc<GeminiClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl QueryGenerator for GeminiQueryGenerator {
    async fn generate(&self, topic: &str, count: usize, current_date: &str) -> QueryPlan {
        if count == 0 {
            return QueryPlan::fallback(topic, 0);
        }
        let prompt = format!(
            "Generate at most {count} diverse web search queries for researching the topic \
             below. The current date is {current_date}.\n\
             Respond with JSON: {{\"query\": [\"...\"], \"rationale\": \"...\"}}.\n\n\
             Topic: {topic}"
        );
        Guard::new("query_generation")
            .or_fallback(
                async {
                    let payload: QueryListPayload =
                        self.client.generate_json(&self.model, &prompt).await?;
                    if payload.query.is_empty() {
                        return Err(AgentError::malformed("query list is empty"));
                    }
                    let mut queries = payload.query;
                    queries.truncate(count);
                    Ok(QueryPlan {
                        queries,
                        rationale: payload.rationale,
                    })
                },
                |_| QueryPlan::fallback(topic, count),
            )
            .await
    }
}

// --- Web search ---

pub struct GeminiSearcher {
    client: Arc<GeminiClient>,
    model: String,
}

impl GeminiSearcher {
    pub fn new(client: Arc<GeminiClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl WebSearcher for GeminiSearcher {
    async fn search(
        &self,
        query: &str,
        query_id: usize,
        current_date: &str,
    ) -> Result<SearchOutput, AgentError> {
        let prompt = format!(
            "Search the web for \"{query}\" and write a concise, factual summary of the most \
             recent and credible findings. The current date is {current_date}."
        );
        let response = Guard::new("web_search")
            .classified(self.client.generate_grounded(&self.model, &prompt))
            .await?;
        Ok(search_output(response, query_id))
    }
}

/// Turn a grounded response into sources and cited text.
pub fn search_output(response: GroundedResponse, query_id: usize) -> SearchOutput {
    let mut sources: Vec<Source> = response
        .chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            Source::new(chunk.title.clone(), chunk.uri.clone())
                .with_short_url(short_url(query_id, index))
                .with_label(label_from_title(&chunk.title))
        })
        .collect();

    for support in &response.supports {
        for &index in &support.chunk_indices {
            if let Some(source) = sources.get_mut(index) {
                if !source.snippet.is_empty() {
                    source.snippet.push(' ');
                }
                source.snippet.push_str(support.text.trim());
            }
        }
    }

    let citations: Vec<Citation> = response
        .supports
        .iter()
        .map(|s| Citation {
            start_index: s.start_index,
            end_index: s.end_index,
            source_indices: s
                .chunk_indices
                .iter()
                .copied()
                .filter(|i| *i < sources.len())
                .collect(),
        })
        .filter(|c| !c.source_indices.is_empty())
        .collect();

    let content = insert_citation_markers(&response.text, &response.supports, &sources);
    SearchOutput {
        content,
        sources,
        citations,
    }
}

/// Append ` [label](short_url)` markers after each supported segment.
///
/// Segments are processed from the end of the text so earlier offsets stay valid.
pub fn insert_citation_markers(
    text: &str,
    supports: &[GroundingSupport],
    sources: &[Source],
) -> String {
    let mut ordered: Vec<&GroundingSupport> = supports.iter().collect();
    ordered.sort_by(|a, b| b.end_index.cmp(&a.end_index));

    let mut result = text.to_string();
    for support in ordered {
        let markers: String = support
            .chunk_indices
            .iter()
            .filter_map(|&i| sources.get(i))
            .map(|s| format!(" [{}]({})", s.display_label(), s.short_url))
            .collect();
        if markers.is_empty() {
            continue;
        }
        let mut at = support.end_index.min(result.len());
        while !result.is_char_boundary(at) {
            at -= 1;
        }
        result.insert_str(at, &markers);
    }
    result
}

// --- Reflection ---

pub struct GeminiReflector {
    client: Arc<GeminiClient>,
    model: String,
}

impl GeminiReflector {
    pub fn new(client: Arc<GeminiClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Reflector for GeminiReflector {
    async fn reflect(
        &self,
        topic: &str,
        summaries: &[String],
        loop_index: usize,
        model: Option<&str>,
    ) -> Reflection {
        let prompt = format!(
            "You are reviewing research on: {topic}\n\
             This is review round {round}. Decide whether the summaries below are sufficient \
             to answer the topic. If not, describe the knowledge gap and propose follow-up \
             search queries.\n\
             Respond with JSON: {{\"is_sufficient\": bool, \"knowledge_gap\": \"...\", \
             \"follow_up_queries\": [\"...\"]}}.\n\nSummaries:\n{summaries}",
            round = loop_index + 1,
            summaries = summaries.join("\n\n---\n\n"),
        );
        let model = model.unwrap_or(&self.model);
        Guard::new("reflection")
            .or_fallback(
                self.client.generate_json::<Reflection>(model, &prompt),
                |err| Reflection::fallback(err),
            )
            .await
    }
}

// --- Finalization ---

pub struct GeminiFinalizer {
    client: Arc<GeminiClient>,
    model: String,
}

impl GeminiFinalizer {
    pub fn new(client: Arc<GeminiClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Finalizer for GeminiFinalizer {
    async fn finalize(
        &self,
        topic: &str,
        summaries: &[String],
        sources: &[Source],
        current_date: &str,
        model: Option<&str>,
    ) -> FinalAnswer {
        let source_list: String = sources
            .iter()
            .map(|s| format!("- [{}]({}): {}\n", s.display_label(), s.short_url, s.title))
            .collect();
        let prompt = format!(
            "Write a well-structured answer to the research topic below using only the \
             summaries and sources given. Cite sources inline as markdown links exactly as \
             listed. The current date is {current_date}.\n\n\
             Topic: {topic}\n\nSummaries:\n{summaries}\n\nSources:\n{source_list}",
            summaries = summaries.join("\n\n---\n\n"),
        );
        let model = model.unwrap_or(&self.model);
        Guard::new("finalize_answer")
            .or_fallback(
                async {
                    let answer = self.client.generate_text(model, &prompt).await?;
                    if answer.trim().is_empty() {
                        return Err(AgentError::malformed("empty answer"));
                    }
                    let used_sources = used_sources(&answer, sources);
                    Ok(FinalAnswer {
                        answer,
                        used_sources,
                    })
                },
                |_| FinalAnswer::fallback(topic, summaries, sources),
            )
            .await
    }
}

/// Sources the answer links to, by short or resolved URL.
fn used_sources(answer: &str, sources: &[Source]) -> Vec<Source> {
    sources
        .iter()
        .filter(|s| cites_link(answer, &s.short_url) || cites_link(answer, &s.url))
        .cloned()
        .collect()
}
