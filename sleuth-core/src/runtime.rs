//! Process-wide resources: the search worker pool and the shared HTTP client.
//!
//! A [`ResourceContext`] is created once at startup and passed by reference
//! to everything that needs it. It owns a dedicated multi-thread tokio
//! runtime whose worker count equals the pool size; a semaphore with the same
//! number of permits bounds how many search tasks run at once.

use crate::config::{HttpConfig, SleuthConfig};
use crate::error::SleuthError;
use crate::http::HttpClient;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::info;

pub const MIN_POOL_SIZE: usize = 4;
pub const MAX_POOL_SIZE: usize = 10;

/// `clamp(cpu_count * 2, 4, 10)`.
pub fn default_pool_size() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    pool_size_for(cpus)
}

pub fn pool_size_for(cpus: usize) -> usize {
    cpus.saturating_mul(2).clamp(MIN_POOL_SIZE, MAX_POOL_SIZE)
}

/// Bounded pool that search tasks are spawned onto.
#[derive(Debug)]
pub struct WorkerPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(handle: Handle, size: usize) -> Self {
        let size = size.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running task.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot. Fails once the pool has been closed.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, SleuthError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SleuthError::PoolShutdown)
    }

    pub fn ensure_open(&self) -> Result<(), SleuthError> {
        if self.is_closed() {
            Err(SleuthError::PoolShutdown)
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Refuse new work. Tasks already holding a permit run to completion.
    pub fn close(&self) {
        self.permits.close();
    }
}

/// The worker pool, its runtime, and the HTTP client, with one lifecycle.
pub struct ResourceContext {
    runtime: Runtime,
    pool: Arc<WorkerPool>,
    http: Arc<HttpClient>,
}

impl ResourceContext {
    /// Start the worker runtime using the pool size and HTTP settings in `config`.
    pub fn start(config: &SleuthConfig) -> Result<Self, SleuthError> {
        let size = config
            .research
            .worker_pool_size
            .unwrap_or_else(default_pool_size);
        Self::with_pool_size(size, config.http.clone())
    }

    pub fn with_pool_size(size: usize, http: HttpConfig) -> Result<Self, SleuthError> {
        let size = size.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(size)
            .thread_name("sleuth-worker")
            .enable_all()
            .build()
            .map_err(|e| SleuthError::PoolStart {
                message: e.to_string(),
            })?;
        let pool = Arc::new(WorkerPool::new(runtime.handle().clone(), size));
        info!(pool_size = size, "Worker pool started");

        Ok(Self {
            runtime,
            pool,
            http: Arc::new(HttpClient::new(http)),
        })
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// Drive `future` to completion from a synchronous caller.
    ///
    /// Must not be called from inside an async context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Stop accepting work without tearing the runtime down.
    pub fn close(&self) {
        self.pool.close();
        self.http.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Close the pool and the HTTP client, then stop the runtime, waiting up
    /// to `grace` for in-flight tasks.
    pub fn shutdown(self, grace: Duration) {
        self.close();
        self.runtime.shutdown_timeout(grace);
        info!("Worker pool shut down");
    }
}

impl std::fmt::Debug for ResourceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceContext")
            .field("pool_size", &self.pool.size())
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_is_clamped() {
        assert_eq!(pool_size_for(1), 4);
        assert_eq!(pool_size_for(3), 6);
        assert_eq!(pool_size_for(64), 10);
        let size = default_pool_size();
        assert!((MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&size));
    }

    #[tokio::test]
    async fn test_pool_permits() {
        let pool = WorkerPool::new(Handle::current(), 2);
        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);
        drop(a);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_work() {
        let pool = WorkerPool::new(Handle::current(), 2);
        pool.close();
        assert!(matches!(pool.acquire().await, Err(SleuthError::PoolShutdown)));
        assert!(pool.ensure_open().is_err());
    }

    #[test]
    fn test_context_lifecycle() {
        let ctx = ResourceContext::with_pool_size(4, HttpConfig::default()).unwrap();
        assert_eq!(ctx.pool().size(), 4);
        assert_eq!(ctx.block_on(async { 21 * 2 }), 42);

        let worker_name = ctx.block_on(async {
            tokio::spawn(async { std::thread::current().name().map(str::to_string) })
                .await
                .unwrap()
        });
        assert_eq!(worker_name.as_deref(), Some("sleuth-worker"));

        ctx.close();
        assert!(ctx.is_closed());
        assert!(ctx.http().is_closed());
        ctx.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_start_honours_pool_override() {
        let mut config = SleuthConfig::default();
        config.research.worker_pool_size = Some(5);
        let ctx = ResourceContext::start(&config).unwrap();
        assert_eq!(ctx.pool().size(), 5);
        ctx.shutdown(Duration::from_millis(100));
    }
}
