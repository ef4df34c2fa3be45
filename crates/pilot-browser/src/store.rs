//! Per-worker driver registry.
//!
//! Each worker owns at most one [`DriverContext`]. Workers are identified by
//! [`WorkerId`]: a task-local identity installed with [`WorkerId::scope`], or
//! the current OS thread when no scope is active. Because tokio tasks can
//! migrate between threads, async test code should always run inside a scope;
//! the harness does this for every test.
//!
//! Slots are only ever touched by their owning worker, so the shared map never
//! sees contention on the same key.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::driver::DriverHandle;
use crate::error::{BrowserError, Result};

tokio::task_local! {
    static CURRENT_WORKER: WorkerId;
}

static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

/// Identity of the execution context that owns a driver slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerId {
    /// Explicit identity allocated by [`WorkerId::next`].
    Task(u64),
    /// Fallback identity of a plain OS thread.
    Thread(ThreadId),
}

impl WorkerId {
    /// Allocates a fresh, process-unique identity.
    pub fn next() -> Self {
        WorkerId::Task(NEXT_WORKER.fetch_add(1, Ordering::Relaxed))
    }

    /// The identity of the calling task or thread.
    pub fn current() -> Self {
        CURRENT_WORKER
            .try_with(|worker| *worker)
            .unwrap_or_else(|_| WorkerId::Thread(std::thread::current().id()))
    }

    /// Runs `future` with this identity installed as the current worker.
    pub async fn scope<F>(self, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_WORKER.scope(self, future).await
    }
}

/// The driver and test identity owned by one worker.
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub driver: DriverHandle,
    pub test_name: String,
    pub correlation_id: String,
}

/// Registry holding one driver context per worker.
#[derive(Debug, Default)]
pub struct DriverStore {
    contexts: DashMap<WorkerId, DriverContext>,
}

impl DriverStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the context for the calling worker, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidContext` when the test name or correlation id is blank.
    pub fn set_context(
        &self,
        driver: DriverHandle,
        test_name: &str,
        correlation_id: &str,
    ) -> Result<()> {
        if test_name.trim().is_empty() {
            return Err(BrowserError::InvalidContext(
                "test name cannot be empty".to_string(),
            ));
        }
        if correlation_id.trim().is_empty() {
            return Err(BrowserError::InvalidContext(
                "correlation id cannot be empty".to_string(),
            ));
        }

        let worker = WorkerId::current();
        let previous = self.contexts.insert(
            worker,
            DriverContext {
                driver,
                test_name: test_name.to_string(),
                correlation_id: correlation_id.to_string(),
            },
        );

        if let Some(previous) = previous {
            warn!(
                ?worker,
                previous_test = %previous.test_name,
                test = %test_name,
                correlation_id,
                "overwriting an active driver context"
            );
        } else {
            debug!(?worker, test = %test_name, correlation_id, "driver context stored");
        }
        Ok(())
    }

    /// Returns the calling worker's driver.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` when nothing is stored for this worker.
    pub fn get_driver(&self) -> Result<DriverHandle> {
        self.contexts
            .get(&WorkerId::current())
            .map(|ctx| ctx.driver.clone())
            .ok_or(BrowserError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.contexts.contains_key(&WorkerId::current())
    }

    /// Snapshot of the calling worker's context.
    pub fn context(&self) -> Option<DriverContext> {
        self.contexts
            .get(&WorkerId::current())
            .map(|ctx| ctx.value().clone())
    }

    pub fn test_name(&self) -> Option<String> {
        self.context().map(|ctx| ctx.test_name)
    }

    pub fn correlation_id(&self) -> Option<String> {
        self.context().map(|ctx| ctx.correlation_id)
    }

    /// Removes and returns the calling worker's context.
    pub fn take_context(&self) -> Option<DriverContext> {
        self.contexts
            .remove(&WorkerId::current())
            .map(|(_, ctx)| ctx)
    }

    /// Clears the calling worker's slot. Idempotent.
    pub fn clear_context(&self) {
        if self.take_context().is_some() {
            debug!(worker = ?WorkerId::current(), "driver context cleared");
        }
    }

    /// Number of workers that currently hold a driver.
    pub fn active_count(&self) -> usize {
        self.contexts.len()
    }

    /// Removes every context, regardless of owner. Used at shutdown.
    pub fn drain(&self) -> Vec<DriverContext> {
        let workers: Vec<WorkerId> = self.contexts.iter().map(|entry| *entry.key()).collect();
        workers
            .into_iter()
            .filter_map(|worker| self.contexts.remove(&worker).map(|(_, ctx)| ctx))
            .collect()
    }
}
