//! Capability traits for the external stages of the research pipeline.
//!
//! Query generation, reflection, and finalization never fail from the
//! pipeline's point of view: each implementation substitutes its own
//! fallback output when the underlying call fails. Search is the exception
//! and reports classified errors, which the fan-out isolates per task.

use super::sources::Source;
use crate::error::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Queries proposed for a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub queries: Vec<String>,
    #[serde(default)]
    pub rationale: String,
}

impl QueryPlan {
    /// The topic itself as the only query, or nothing when `count` is 0.
    pub fn fallback(topic: &str, count: usize) -> Self {
        let mut queries = vec![topic.to_string()];
        queries.truncate(count);
        Self {
            queries,
            rationale: "Query generation unavailable; searching the topic directly.".to_string(),
        }
    }
}

/// A span of search text supported by one or more sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub start_index: usize,
    pub end_index: usize,
    /// Indices into [`SearchOutput::sources`].
    pub source_indices: Vec<usize>,
}

/// What one web search returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutput {
    /// Summarized findings, with citation markers inserted.
    pub content: String,
    pub sources: Vec<Source>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl SearchOutput {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.sources.is_empty()
    }
}

/// Judgement on whether gathered evidence answers the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub is_sufficient: bool,
    #[serde(default)]
    pub knowledge_gap: String,
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
}

impl Reflection {
    /// Insufficient with no follow-ups, so the loop stops and finalizes.
    pub fn fallback(reason: impl std::fmt::Display) -> Self {
        Self {
            is_sufficient: false,
            knowledge_gap: format!("Reflection unavailable: {reason}"),
            follow_up_queries: Vec::new(),
        }
    }
}

/// The written answer and the sources it relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub answer: String,
    pub used_sources: Vec<Source>,
}

impl FinalAnswer {
    /// Compose an answer from the raw summaries and list the sources.
    pub fn fallback(topic: &str, summaries: &[String], sources: &[Source]) -> Self {
        let mut answer = if summaries.is_empty() {
            format!("No research findings could be gathered for: {topic}")
        } else {
            format!(
                "Research findings for: {topic}\n\n{}",
                summaries
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n")
            )
        };
        if !sources.is_empty() {
            answer.push_str("\n\nSources:");
            for source in sources {
                answer.push_str(&format!("\n- [{}]({})", source.display_label(), source.url));
            }
        }
        Self {
            answer,
            used_sources: sources.to_vec(),
        }
    }
}

#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// Propose up to `count` search queries for `topic`.
    async fn generate(&self, topic: &str, count: usize, current_date: &str) -> QueryPlan;
}

#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(
        &self,
        query: &str,
        query_id: usize,
        current_date: &str,
    ) -> Result<SearchOutput, AgentError>;
}

#[async_trait]
pub trait Reflector: Send + Sync {
    async fn reflect(
        &self,
        topic: &str,
        summaries: &[String],
        loop_index: usize,
        model: Option<&str>,
    ) -> Reflection;
}

#[async_trait]
pub trait Finalizer: Send + Sync {
    /// Write the answer using only `sources`.
    async fn finalize(
        &self,
        topic: &str,
        summaries: &[String],
        sources: &[Source],
        current_date: &str,
        model: Option<&str>,
    ) -> FinalAnswer;
}

/// The set of collaborators injected into the controller.
#[derive(Clone)]
pub struct Collaborators {
    pub query_generator: Arc<dyn QueryGenerator>,
    pub searcher: Arc<dyn WebSearcher>,
    pub reflector: Arc<dyn Reflector>,
    pub finalizer: Arc<dyn Finalizer>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
