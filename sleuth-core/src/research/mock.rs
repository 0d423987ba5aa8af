//! Scripted collaborators for tests and offline development.

use super::collaborators::{
    FinalAnswer, Finalizer, QueryGenerator, QueryPlan, Reflection, Reflector, SearchOutput,
    WebSearcher,
};
use super::sources::Source;
use crate::classify::ErrorKind;
use crate::error::AgentError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns fixed queries, or numbered variations of the topic.
#[derive(Default)]
pub struct StaticQueryGenerator {
    queries: Option<Vec<String>>,
    calls: AtomicUsize,
}

impl StaticQueryGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queries<I, S>(queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queries: Some(queries.into_iter().map(Into::into).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryGenerator for StaticQueryGenerator {
    async fn generate(&self, topic: &str, count: usize, _current_date: &str) -> QueryPlan {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queries = match &self.queries {
            Some(queries) => queries.clone(),
            None => (1..=count).map(|i| format!("{topic} aspect {i}")).collect(),
        };
        queries.truncate(count);
        QueryPlan {
            queries,
            rationale: "scripted".to_string(),
        }
    }
}

/// Searcher whose behaviour is scripted per query id.
#[derive(Default)]
pub struct ScriptedSearcher {
    failing: HashSet<usize>,
    empty: HashSet<usize>,
    panicking: HashSet<usize>,
    delays: HashMap<usize, Duration>,
    latency: Option<Duration>,
    sources: HashMap<usize, Vec<Source>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries with these ids fail with an API error.
    pub fn failing(mut self, ids: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(ids);
        self
    }

    /// Queries with these ids succeed with nothing found.
    pub fn empty(mut self, ids: impl IntoIterator<Item = usize>) -> Self {
        self.empty.extend(ids);
        self
    }

    pub fn panicking(mut self, ids: impl IntoIterator<Item = usize>) -> Self {
        self.panicking.extend(ids);
        self
    }

    pub fn delay(mut self, id: usize, delay: Duration) -> Self {
        self.delays.insert(id, delay);
        self
    }

    /// Delay applied to every query without its own delay.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_sources(mut self, id: usize, sources: Vec<Source>) -> Self {
        self.sources.insert(id, sources);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of searches observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn default_sources(query: &str, query_id: usize) -> Vec<Source> {
        vec![
            Source::new(query, format!("https://research.example.edu/papers/{query_id}"))
                .with_short_url(format!(
                    "https://vertexaisearch.cloud.google.com/id/{query_id}-0"
                ))
                .with_label("example")
                .with_snippet(format!(
                    "A peer reviewed study covering {query} in depth, with methods, data, and results."
                )),
        ]
    }
}

#[async_trait]
impl WebSearcher for ScriptedSearcher {
    async fn search(
        &self,
        query: &str,
        query_id: usize,
        _current_date: &str,
    ) -> Result<SearchOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&query_id).copied().or(self.latency) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(&query_id) {
            panic!("scripted panic for query {query_id}");
        }
        if self.failing.contains(&query_id) {
            return Err(AgentError::new(
                format!("HTTP 503 for query {query_id}"),
                ErrorKind::Api,
            ));
        }
        if self.empty.contains(&query_id) {
            return Ok(SearchOutput::default());
        }

        let sources = self
            .sources
            .get(&query_id)
            .cloned()
            .unwrap_or_else(|| Self::default_sources(query, query_id));
        Ok(SearchOutput {
            content: format!("Findings for '{query}'."),
            sources,
            citations: Vec::new(),
        })
    }
}

/// Replays queued reflections, then repeats a default.
pub struct ScriptedReflector {
    queue: Mutex<VecDeque<Reflection>>,
    default: Reflection,
    seen_loops: Mutex<Vec<usize>>,
}

impl ScriptedReflector {
    pub fn new(reflections: Vec<Reflection>, default: Reflection) -> Self {
        Self {
            queue: Mutex::new(reflections.into()),
            default,
            seen_loops: Mutex::new(Vec::new()),
        }
    }

    pub fn sufficient() -> Self {
        Self::new(Vec::new(), Self::sufficient_reflection())
    }

    /// Never satisfied; always proposes one more query.
    pub fn never_satisfied() -> Self {
        Self::new(Vec::new(), Self::never_satisfied_reflection())
    }

    pub fn sufficient_reflection() -> Reflection {
        Reflection {
            is_sufficient: true,
            knowledge_gap: String::new(),
            follow_up_queries: Vec::new(),
        }
    }

    pub fn never_satisfied_reflection() -> Reflection {
        Reflection {
            is_sufficient: false,
            knowledge_gap: "more detail needed".to_string(),
            follow_up_queries: vec!["follow-up".to_string()],
        }
    }

    /// Loop indices passed to `reflect`, in call order.
    pub fn seen_loops(&self) -> Vec<usize> {
        lock(&self.seen_loops).clone()
    }
}

#[async_trait]
impl Reflector for ScriptedReflector {
    async fn reflect(
        &self,
        _topic: &str,
        _summaries: &[String],
        loop_index: usize,
        _model: Option<&str>,
    ) -> Reflection {
        lock(&self.seen_loops).push(loop_index);
        lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Writes an answer that cites every source it is given.
#[derive(Default)]
pub struct EchoFinalizer {
    received: Mutex<Vec<Source>>,
}

impl EchoFinalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources passed to the last `finalize` call.
    pub fn received(&self) -> Vec<Source> {
        lock(&self.received).clone()
    }
}

#[async_trait]
impl Finalizer for EchoFinalizer {
    async fn finalize(
        &self,
        topic: &str,
        summaries: &[String],
        sources: &[Source],
        _current_date: &str,
        _model: Option<&str>,
    ) -> FinalAnswer {
        *lock(&self.received) = sources.to_vec();
        let citations: Vec<String> = sources
            .iter()
            .map(|s| {
                let link = if s.short_url.is_empty() { &s.url } else { &s.short_url };
                format!("[{}]({link})", s.display_label())
            })
            .collect();
        FinalAnswer {
            answer: format!(
                "Answer to '{topic}' from {} findings. {}",
                summaries.len(),
                citations.join(" ")
            ),
            used_sources: sources.to_vec(),
        }
    }
}
