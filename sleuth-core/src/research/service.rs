//! Process-level research entry points.
//!
//! [`ResearchService`] owns the [`ResourceContext`] and one shared
//! [`ResearchController`]. `conduct_research` blocks the calling thread;
//! `conduct_research_async` runs the pipeline on the worker runtime and can be
//! awaited from any executor.

use super::collaborators::Collaborators;
use super::controller::{ResearchCallback, ResearchController, ResearchOutcome, ResearchRequest};
use crate::classify::ErrorKind;
use crate::config::ResearchConfig;
use crate::error::{AgentError, SleuthError};
use crate::runtime::ResourceContext;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

pub struct ResearchService {
    resources: ResourceContext,
    controller: Arc<ResearchController>,
    config: ResearchConfig,
}

impl ResearchService {
    pub fn new(
        resources: ResourceContext,
        collaborators: Collaborators,
        config: &ResearchConfig,
    ) -> Self {
        let controller = ResearchController::new(collaborators, resources.pool().clone(), config);
        Self {
            resources,
            controller: Arc::new(controller),
            config: config.clone(),
        }
    }

    /// Like [`new`](Self::new), reporting progress to `callback`.
    pub fn with_callback(
        resources: ResourceContext,
        collaborators: Collaborators,
        config: &ResearchConfig,
        callback: Arc<dyn ResearchCallback>,
    ) -> Self {
        let controller = ResearchController::new(collaborators, resources.pool().clone(), config)
            .with_callback(callback);
        Self {
            resources,
            controller: Arc::new(controller),
            config: config.clone(),
        }
    }

    pub fn resources(&self) -> &ResourceContext {
        &self.resources
    }

    pub fn controller(&self) -> &Arc<ResearchController> {
        &self.controller
    }

    /// A request for `question` using the configured defaults.
    pub fn request(&self, question: impl Into<String>) -> ResearchRequest {
        ResearchRequest::from_config(question, &self.config)
    }

    /// Run a request to completion, blocking the calling thread.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`conduct_research_async`](Self::conduct_research_async) there.
    pub fn conduct_research(&self, request: ResearchRequest) -> Result<ResearchOutcome, SleuthError> {
        self.resources.block_on(self.conduct_research_async(request))
    }

    /// Run a request on the worker runtime and await the result.
    pub async fn conduct_research_async(
        &self,
        request: ResearchRequest,
    ) -> Result<ResearchOutcome, SleuthError> {
        self.resources.pool().ensure_open()?;
        let controller = self.controller.clone();
        let handle = self
            .resources
            .handle()
            .spawn(async move { controller.run(request).await });

        match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => Err(SleuthError::PoolShutdown),
            Err(join_err) => {
                error!(error = %join_err, "Research task panicked");
                Err(SleuthError::Agent(AgentError::new(
                    format!("research task panicked: {join_err}"),
                    ErrorKind::Unknown,
                )))
            }
        }
    }

    /// Refuse new requests. Later calls fail with [`SleuthError::PoolShutdown`].
    pub fn close(&self) {
        self.resources.close();
    }

    /// Close everything and stop the worker runtime.
    pub fn shutdown(self, grace: Duration) {
        self.resources.shutdown(grace);
    }
}
