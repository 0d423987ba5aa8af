//! Request-scoped research state and the pipeline state machine.

use super::fanout::{FanoutReport, SearchTask};
use super::sources::Source;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Current phase of a research run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ResearchPhase {
    Init,
    QueryGeneration,
    InitialSearch,
    /// Judging the evidence; follow-up rounds run inside this phase.
    Reflecting { loop_index: usize },
    Finalizing,
    Done,
}

impl ResearchPhase {
    pub fn can_transition_to(&self, next: &ResearchPhase) -> bool {
        use ResearchPhase::*;
        match (self, next) {
            (Init, QueryGeneration) => true,
            (QueryGeneration, InitialSearch) => true,
            (InitialSearch, Reflecting { loop_index: 0 }) => true,
            (Reflecting { loop_index: a }, Reflecting { loop_index: b }) => *b == a + 1,
            (Reflecting { .. }, Finalizing) => true,
            (Finalizing, Done) => true,
            _ => false,
        }
    }

    /// Short name for logs and progress callbacks.
    pub fn name(&self) -> &'static str {
        match self {
            ResearchPhase::Init => "init",
            ResearchPhase::QueryGeneration => "query_generation",
            ResearchPhase::InitialSearch => "initial_search",
            ResearchPhase::Reflecting { .. } => "reflecting",
            ResearchPhase::Finalizing => "finalizing",
            ResearchPhase::Done => "done",
        }
    }

    /// Rough completion fraction given the loop budget.
    pub fn progress(&self, max_loops: usize) -> f32 {
        match self {
            ResearchPhase::Init => 0.0,
            ResearchPhase::QueryGeneration => 0.1,
            ResearchPhase::InitialSearch => 0.3,
            ResearchPhase::Reflecting { loop_index } => {
                let span = (max_loops + 1) as f32;
                0.5 + 0.35 * (*loop_index as f32 / span)
            }
            ResearchPhase::Finalizing => 0.9,
            ResearchPhase::Done => 1.0,
        }
    }
}

/// Why the reflection loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Reflection judged the evidence sufficient.
    Sufficient,
    /// `max_research_loops` follow-up rounds have run.
    LoopBudgetExhausted,
    /// Reflection was insufficient but proposed nothing further to search.
    NoFollowUpQueries,
}

/// What each stage produced, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageOutcome {
    QueryGeneration {
        queries: Vec<String>,
        rationale: String,
    },
    Search {
        loop_index: usize,
        submitted: usize,
        succeeded: usize,
        failed: usize,
        dropped: usize,
        sources_found: usize,
    },
    Reflection {
        loop_index: usize,
        is_sufficient: bool,
        knowledge_gap: String,
        follow_up_queries: Vec<String>,
    },
    Finalization {
        included_sources: usize,
        filtered_sources: usize,
        cited_sources: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Mutable state of one research request. Never shared between requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub request_id: Uuid,
    pub topic: String,
    /// Human-readable date passed to every collaborator.
    pub current_date: String,
    pub messages: Vec<Message>,
    pub search_queries: Vec<String>,
    /// Search summaries, in completion order.
    pub web_research_results: Vec<String>,
    pub sources_gathered: Vec<Source>,
    pub research_loop_count: usize,
    pub max_research_loops: usize,
    pub initial_search_query_count: usize,
    pub reasoning_model: Option<String>,
    pub phase: ResearchPhase,
    pub stages: Vec<StageOutcome>,
    next_query_id: usize,
}

impl ResearchState {
    pub fn new(
        topic: impl Into<String>,
        current_date: impl Into<String>,
        initial_search_query_count: usize,
        max_research_loops: usize,
        reasoning_model: Option<String>,
    ) -> Self {
        let topic = topic.into();
        Self {
            request_id: Uuid::new_v4(),
            messages: vec![Message::user(topic.clone())],
            topic,
            current_date: current_date.into(),
            search_queries: Vec::new(),
            web_research_results: Vec::new(),
            sources_gathered: Vec::new(),
            research_loop_count: 0,
            max_research_loops,
            initial_search_query_count,
            reasoning_model,
            phase: ResearchPhase::Init,
            stages: Vec::new(),
            next_query_id: 0,
        }
    }

    pub fn transition(&mut self, next: ResearchPhase) {
        if !self.phase.can_transition_to(&next) {
            warn!(
                request_id = %self.request_id,
                from = self.phase.name(),
                to = next.name(),
                "Unexpected research phase transition"
            );
        }
        self.phase = next;
    }

    /// Turn queries into search tasks with fresh ids and record them.
    pub fn plan_tasks(&mut self, queries: Vec<String>) -> Vec<SearchTask> {
        queries
            .into_iter()
            .map(|query| {
                let task = SearchTask {
                    query: query.clone(),
                    query_id: self.next_query_id,
                };
                self.next_query_id += 1;
                self.search_queries.push(query);
                task
            })
            .collect()
    }

    /// Merge one fan-out round into the state in a single update.
    pub fn absorb(&mut self, report: &FanoutReport) {
        let mut contents = Vec::with_capacity(report.responses.len());
        let mut sources = Vec::new();
        for response in &report.responses {
            if !response.output.content.trim().is_empty() {
                contents.push(response.output.content.clone());
            }
            sources.extend(response.output.sources.iter().cloned());
        }
        self.web_research_results.extend(contents);
        self.sources_gathered.extend(sources);
    }

    /// Count one completed follow-up round. Never exceeds the budget.
    pub fn complete_loop(&mut self) -> bool {
        if self.research_loop_count >= self.max_research_loops {
            return false;
        }
        self.research_loop_count += 1;
        true
    }

    pub fn loop_budget_exhausted(&self) -> bool {
        self.research_loop_count >= self.max_research_loops
    }

    pub fn record(&mut self, outcome: StageOutcome) {
        self.stages.push(outcome);
    }

    pub fn total_queries(&self) -> usize {
        self.search_queries.len()
    }
}
