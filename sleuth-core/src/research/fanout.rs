//! Concurrent search fan-out.
//!
//! Each query becomes an independent task on the worker pool. Results are
//! collected in completion order and every task's failure stays inside that
//! task: a failed search is logged and reported, never raised. Only a pool
//! shutdown aborts the batch.

use super::collaborators::{SearchOutput, WebSearcher};
use crate::classify::ErrorKind;
use crate::error::SleuthError;
use crate::runtime::WorkerPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchStatus {
    Success,
    NoResults,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTask {
    pub query: String,
    pub query_id: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub query_id: usize,
    pub status: SearchStatus,
    pub output: SearchOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Outcome of one fan-out round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FanoutReport {
    /// `SUCCESS` and `NO_RESULTS` responses, in completion order.
    pub responses: Vec<SearchResponse>,
    /// `ERROR` responses, in completion order.
    pub failures: Vec<SearchResponse>,
    /// Tasks that produced no response at all.
    pub dropped: usize,
}

impl FanoutReport {
    pub fn submitted(&self) -> usize {
        self.responses.len() + self.failures.len() + self.dropped
    }

    pub fn sources_found(&self) -> usize {
        self.responses.iter().map(|r| r.output.sources.len()).sum()
    }
}

/// Runs search tasks in parallel on a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct SearchFanout {
    pool: Arc<WorkerPool>,
}

impl SearchFanout {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Run every task and wait for all of them.
    ///
    /// Siblings are never cancelled early. Returns `Err` only when the pool
    /// has been shut down.
    pub async fn execute(
        &self,
        searcher: Arc<dyn WebSearcher>,
        tasks: Vec<SearchTask>,
        current_date: &str,
    ) -> Result<FanoutReport, SleuthError> {
        self.pool.ensure_open()?;
        let submitted = tasks.len();
        let mut set = JoinSet::new();

        for task in tasks {
            let pool = self.pool.clone();
            let searcher = searcher.clone();
            let current_date = current_date.to_string();
            set.spawn_on(
                async move {
                    let _permit = pool.acquire().await?;
                    Ok::<_, SleuthError>(run_search(searcher.as_ref(), task, &current_date).await)
                },
                self.pool.handle(),
            );
        }

        let mut report = FanoutReport::default();
        let mut fatal = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(response)) if response.status == SearchStatus::Error => {
                    report.failures.push(response)
                }
                Ok(Ok(response)) => report.responses.push(response),
                Ok(Err(err)) => {
                    fatal.get_or_insert(err);
                }
                Err(join_err) if join_err.is_cancelled() => {
                    fatal.get_or_insert(SleuthError::PoolShutdown);
                }
                Err(join_err) => {
                    error!(error = %join_err, "Search task panicked; dropping it");
                    report.dropped += 1;
                }
            }
        }

        if let Some(err) = fatal {
            error!(error = %err, "Search fan-out aborted");
            return Err(err);
        }

        info!(
            submitted,
            succeeded = report.responses.len(),
            failed = report.failures.len(),
            dropped = report.dropped,
            "Search fan-out complete"
        );
        Ok(report)
    }
}

async fn run_search(searcher: &dyn WebSearcher, task: SearchTask, current_date: &str) -> SearchResponse {
    debug!(query_id = task.query_id, query = %task.query, "Search task started");
    match searcher.search(&task.query, task.query_id, current_date).await {
        Ok(output) => {
            let status = if output.is_empty() {
                SearchStatus::NoResults
            } else {
                SearchStatus::Success
            };
            debug!(
                query_id = task.query_id,
                sources = output.sources.len(),
                ?status,
                "Search task finished"
            );
            SearchResponse {
                query: task.query,
                query_id: task.query_id,
                status,
                output,
                error: None,
                error_kind: None,
            }
        }
        Err(err) => {
            warn!(
                query_id = task.query_id,
                kind = %err.kind,
                error = %err.message,
                "Search task failed"
            );
            SearchResponse {
                query: task.query,
                query_id: task.query_id,
                status: SearchStatus::Error,
                output: SearchOutput::default(),
                error: Some(err.message),
                error_kind: Some(err.kind),
            }
        }
    }
}
