//! Research pipeline controller.
//!
//! Drives query generation, the initial search round, the reflection loop,
//! and finalization for one request at a time. All mutable state lives in a
//! [`ResearchState`] built inside [`ResearchController::run`], so a single
//! controller can serve concurrent requests.

use super::collaborators::{Collaborators, FinalAnswer};
use super::fanout::SearchFanout;
use super::sources::{Source, cites_link, dedupe_by_url, replace_link};
use super::state::{Message, ResearchPhase, ResearchState, StageOutcome, StopReason};
use crate::config::ResearchConfig;
use crate::error::SleuthError;
use crate::quality::{CredibilityClassifier, QualityFilter, QualitySummary, QualityThreshold};
use crate::runtime::WorkerPool;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Callback for progressive research updates.
pub trait ResearchCallback: Send + Sync {
    /// Called when the research phase changes.
    fn on_phase_change(&self, phase: &ResearchPhase, progress: f32);
    /// Called after each search round.
    fn on_search_round(&self, _loop_index: usize, _succeeded: usize, _failed: usize) {}
    /// Called after each reflection.
    fn on_reflection(&self, _loop_index: usize, _is_sufficient: bool) {}
}

/// No-op callback.
pub struct NoOpResearchCallback;

impl ResearchCallback for NoOpResearchCallback {
    fn on_phase_change(&self, _phase: &ResearchPhase, _progress: f32) {}
}

/// One research question and its per-request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub question: String,
    pub initial_search_query_count: usize,
    pub max_research_loops: usize,
    /// Model override for reflection and finalization.
    #[serde(default)]
    pub reasoning_model: Option<String>,
    /// Overrides the configured quality threshold.
    #[serde(default)]
    pub quality_threshold: Option<QualityThreshold>,
}

impl ResearchRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            initial_search_query_count: 3,
            max_research_loops: 2,
            reasoning_model: None,
            quality_threshold: None,
        }
    }

    /// A request using the configured query count and loop budget.
    pub fn from_config(question: impl Into<String>, config: &ResearchConfig) -> Self {
        Self::new(question)
            .with_query_count(config.initial_search_query_count)
            .with_max_loops(config.max_research_loops)
    }

    pub fn with_query_count(mut self, count: usize) -> Self {
        self.initial_search_query_count = count;
        self
    }

    pub fn with_max_loops(mut self, loops: usize) -> Self {
        self.max_research_loops = loops;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.reasoning_model = Some(model.into());
        self
    }

    pub fn with_threshold(mut self, threshold: QualityThreshold) -> Self {
        self.quality_threshold = Some(threshold);
        self
    }
}

/// Everything a finished research run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub request_id: Uuid,
    pub final_answer: String,
    /// Sources the answer relies on; all passed the quality threshold.
    pub sources: Vec<Source>,
    /// Best sources that fell below the threshold, kept for display.
    pub filtered_sources: Vec<Source>,
    pub research_loops_executed: usize,
    pub total_queries: usize,
    pub quality_summary: QualitySummary,
    pub stop_reason: StopReason,
    pub stages: Vec<StageOutcome>,
    pub messages: Vec<Message>,
}

/// Orchestrates the research stages over injected collaborators.
pub struct ResearchController {
    collaborators: Collaborators,
    fanout: SearchFanout,
    filter: QualityFilter,
    default_threshold: QualityThreshold,
    callback: Arc<dyn ResearchCallback>,
}

impl ResearchController {
    pub fn new(collaborators: Collaborators, pool: Arc<WorkerPool>, config: &ResearchConfig) -> Self {
        let classifier = Arc::new(CredibilityClassifier::new(config.credibility_cache_capacity));
        Self {
            collaborators,
            fanout: SearchFanout::new(pool),
            filter: QualityFilter::new(classifier, config.filtered_retain_cap),
            default_threshold: config.quality_threshold,
            callback: Arc::new(NoOpResearchCallback),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// The credibility classifier shared by every request.
    pub fn classifier(&self) -> &Arc<CredibilityClassifier> {
        self.filter.classifier()
    }

    /// Run one request to completion.
    ///
    /// Stage failures degrade the outcome instead of failing the run. Only a
    /// pool shutdown or a quality threshold outside [0, 1] is returned as an error.
    #[instrument(skip_all, fields(question = %request.question))]
    pub async fn run(&self, request: ResearchRequest) -> Result<ResearchOutcome, SleuthError> {
        let threshold = request.quality_threshold.unwrap_or(self.default_threshold);
        threshold.validate()?;

        let mut state = ResearchState::new(
            request.question.clone(),
            current_date(),
            request.initial_search_query_count,
            request.max_research_loops,
            request.reasoning_model.clone(),
        );
        info!(
            request_id = %state.request_id,
            initial_queries = state.initial_search_query_count,
            max_loops = state.max_research_loops,
            "Research started"
        );

        self.generate_queries(&mut state).await?;
        let stop_reason = self.reflection_loop(&mut state).await?;
        let (final_answer, sources, filtered_sources, quality_summary) =
            self.finalize(&mut state, threshold).await;

        self.enter(&mut state, ResearchPhase::Done);
        info!(
            request_id = %state.request_id,
            loops = state.research_loop_count,
            queries = state.total_queries(),
            sources = sources.len(),
            ?stop_reason,
            "Research complete"
        );

        Ok(ResearchOutcome {
            request_id: state.request_id,
            final_answer,
            sources,
            filtered_sources,
            research_loops_executed: state.research_loop_count,
            total_queries: state.total_queries(),
            quality_summary,
            stop_reason,
            stages: state.stages,
            messages: state.messages,
        })
    }

    async fn generate_queries(&self, state: &mut ResearchState) -> Result<(), SleuthError> {
        self.enter(state, ResearchPhase::QueryGeneration);
        let count = state.initial_search_query_count;
        let mut plan = self
            .collaborators
            .query_generator
            .generate(&state.topic, count, &state.current_date)
            .await;
        plan.queries.retain(|q| !q.trim().is_empty());
        plan.queries.truncate(count);
        debug!(queries = ?plan.queries, "Queries generated");
        state.record(StageOutcome::QueryGeneration {
            queries: plan.queries.clone(),
            rationale: plan.rationale,
        });

        self.enter(state, ResearchPhase::InitialSearch);
        self.search_round(state, plan.queries, 0).await
    }

    async fn reflection_loop(&self, state: &mut ResearchState) -> Result<StopReason, SleuthError> {
        loop {
            let loop_index = state.research_loop_count;
            self.enter(state, ResearchPhase::Reflecting { loop_index });

            let reflection = self
                .collaborators
                .reflector
                .reflect(
                    &state.topic,
                    &state.web_research_results,
                    loop_index,
                    state.reasoning_model.as_deref(),
                )
                .await;
            self.callback
                .on_reflection(loop_index, reflection.is_sufficient);

            let follow_ups: Vec<String> = reflection
                .follow_up_queries
                .iter()
                .map(|q| q.trim())
                .filter(|q| !q.is_empty())
                .map(str::to_string)
                .collect();
            state.record(StageOutcome::Reflection {
                loop_index,
                is_sufficient: reflection.is_sufficient,
                knowledge_gap: reflection.knowledge_gap,
                follow_up_queries: follow_ups.clone(),
            });

            if reflection.is_sufficient {
                return Ok(StopReason::Sufficient);
            }
            if state.loop_budget_exhausted() {
                return Ok(StopReason::LoopBudgetExhausted);
            }
            if follow_ups.is_empty() {
                info!(loop_index, "Reflection proposed no follow-up queries");
                return Ok(StopReason::NoFollowUpQueries);
            }

            self.search_round(state, follow_ups, loop_index + 1).await?;
            state.complete_loop();
        }
    }

    async fn search_round(
        &self,
        state: &mut ResearchState,
        queries: Vec<String>,
        loop_index: usize,
    ) -> Result<(), SleuthError> {
        let tasks = state.plan_tasks(queries);
        let submitted = tasks.len();
        let report = self
            .fanout
            .execute(
                self.collaborators.searcher.clone(),
                tasks,
                &state.current_date,
            )
            .await?;

        state.absorb(&report);
        state.record(StageOutcome::Search {
            loop_index,
            submitted,
            succeeded: report.responses.len(),
            failed: report.failures.len(),
            dropped: report.dropped,
            sources_found: report.sources_found(),
        });
        self.callback
            .on_search_round(loop_index, report.responses.len(), report.failures.len());
        Ok(())
    }

    async fn finalize(
        &self,
        state: &mut ResearchState,
        threshold: QualityThreshold,
    ) -> (String, Vec<Source>, Vec<Source>, QualitySummary) {
        self.enter(state, ResearchPhase::Finalizing);

        let unique = dedupe_by_url(state.sources_gathered.clone());
        let filtered = self.filter.apply(unique, &state.topic, threshold);

        let answer = self
            .collaborators
            .finalizer
            .finalize(
                &state.topic,
                &state.web_research_results,
                &filtered.included,
                &state.current_date,
                state.reasoning_model.as_deref(),
            )
            .await;

        // Every alias of an included URL, including ones dropped by the dedupe.
        let included_urls: HashSet<&str> =
            filtered.included.iter().map(|s| s.url.as_str()).collect();
        let aliases: Vec<&Source> = state
            .sources_gathered
            .iter()
            .filter(|s| included_urls.contains(s.url.as_str()))
            .collect();
        let sources = cited_sources(&answer, &filtered.included, &aliases);
        let final_answer = resolve_short_urls(&answer.answer, &aliases);

        state.record(StageOutcome::Finalization {
            included_sources: filtered.summary.included_sources,
            filtered_sources: filtered.summary.filtered_sources,
            cited_sources: sources.len(),
        });
        state.messages.push(Message::assistant(final_answer.clone()));

        (final_answer, sources, filtered.filtered, filtered.summary)
    }

    fn enter(&self, state: &mut ResearchState, phase: ResearchPhase) {
        state.transition(phase);
        debug!(request_id = %state.request_id, phase = phase.name(), "Phase change");
        self.callback
            .on_phase_change(&phase, phase.progress(state.max_research_loops));
    }
}

fn current_date() -> String {
    Utc::now().format("%B %d, %Y").to_string()
}

/// The included sources the finalizer used or the answer links to through any
/// alias, or every included source when none match.
fn cited_sources(answer: &FinalAnswer, included: &[Source], aliases: &[&Source]) -> Vec<Source> {
    let mut cited: HashSet<&str> = answer.used_sources.iter().map(|s| s.url.as_str()).collect();
    cited.extend(
        aliases
            .iter()
            .filter(|s| cites_link(&answer.answer, &s.short_url))
            .map(|s| s.url.as_str()),
    );
    let used: Vec<Source> = included
        .iter()
        .filter(|s| cited.contains(s.url.as_str()))
        .cloned()
        .collect();
    if used.is_empty() {
        included.to_vec()
    } else {
        used
    }
}

/// Replace each short redirect URL in the answer with the resolved URL.
fn resolve_short_urls(answer: &str, aliases: &[&Source]) -> String {
    let mut resolved = answer.to_string();
    for source in aliases {
        resolved = replace_link(&resolved, &source.short_url, &source.url);
    }
    resolved
}
