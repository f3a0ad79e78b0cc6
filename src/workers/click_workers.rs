//! # Click Ingestion Pipeline
//!
//! Moves click recording off the redirect path.
//!
//! ```text
//!  redirect ──submit()──▶ [ bounded queue ] ──▶ worker 1 ──▶ ClickStore
//!  redirect ──submit()──▶                   ──▶ worker 2 ──▶ ClickStore
//!                 │                         ──▶ worker N ──▶ ClickStore
//!                 └─ full: drop + warn
//! ```
//!
//! - `submit` is a plain (non-async) function built on `try_send`: it either
//!   enqueues or drops, it never waits.
//! - Workers share the receiving end; whichever is idle takes the next
//!   event. No ordering holds between events once there is more than one
//!   worker.
//! - A failed insert is logged and forgotten, the worker moves on.
//! - Closing the queue is the only shutdown signal: workers drain what is
//!   left and exit when the channel reports closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    database::ClickStore,
    error::{AppError, Result},
    models::{Click, ClickEvent},
};

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<ClickEvent>>>;

// =====================================
// Submit Outcome
// =====================================
/// What happened to a submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued; a worker will try to persist it
    Enqueued,
    /// Discarded because the queue was full or already closed
    Dropped,
}

impl SubmitOutcome {
    #[must_use]
    pub fn is_enqueued(self) -> bool {
        matches!(self, Self::Enqueued)
    }
}

// =====================================
// Counters
// =====================================
/// Pipeline counters since creation.
#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of the pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    pub accepted: u64,
    pub dropped: u64,
    pub persisted: u64,
    pub failed: u64,
    /// Events currently waiting in the queue
    pub queued: usize,
}

/// How the worker pool ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that finished within the grace period
    pub drained: usize,
    /// Workers aborted when the grace period ran out
    pub aborted: usize,
    /// Events still queued when the pool stopped
    pub abandoned: usize,
}

// =====================================
// Click Pipeline
// =====================================
/// Bounded click queue plus its consumer pool.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct ClickPipeline {
    capacity: usize,
    sender: RwLock<Option<mpsc::Sender<ClickEvent>>>,
    receiver: SharedReceiver,
    workers: Mutex<Option<Vec<JoinHandle<()>>>>,
    store: Arc<dyn ClickStore>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for ClickPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickPipeline")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ClickPipeline {
    /// Creates the queue. No worker runs until [`Self::start_workers`].
    ///
    /// # Errors
    /// Returns [`AppError::Config`] if `capacity` is 0.
    pub fn new(store: Arc<dyn ClickStore>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(AppError::Config("click queue capacity cannot be 0".to_string()));
        }

        let (tx, rx) = mpsc::channel(capacity);
        Ok(Self {
            capacity,
            sender: RwLock::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            workers: Mutex::new(None),
            store,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Maximum number of queued events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tries to queue `event` without waiting.
    ///
    /// A full or closed queue drops the event and logs a warning; the caller
    /// is never failed.
    pub fn submit(&self, event: ClickEvent) -> SubmitOutcome {
        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);

        let Some(tx) = sender.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(link_id = event.link_id, "Click queue is closed, dropping click event");
            return SubmitOutcome::Dropped;
        };

        match tx.try_send(event) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                SubmitOutcome::Enqueued
            }
            Err(TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    link_id = event.link_id,
                    capacity = self.capacity,
                    "Click queue is full, dropping click event"
                );
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Closed(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(link_id = event.link_id, "Click queue is closed, dropping click event");
                SubmitOutcome::Dropped
            }
        }
    }

    /// Spawns `count` workers on the current tokio runtime.
    ///
    /// # Errors
    /// - [`AppError::Config`] if `count` is 0
    /// - [`AppError::Internal`] if the workers were already started
    pub fn start_workers(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(AppError::Config("worker count cannot be 0".to_string()));
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers.is_some() {
            return Err(AppError::Internal("click workers already started".to_string()));
        }

        info!(count, capacity = self.capacity, "Starting click workers");

        let handles = (0..count)
            .map(|worker_id| {
                tokio::spawn(click_worker(
                    worker_id,
                    self.receiver.clone(),
                    self.store.clone(),
                    self.counters.clone(),
                ))
            })
            .collect();

        *workers = Some(handles);
        Ok(())
    }

    /// Closes the queue. Later submits are dropped; queued events are still
    /// delivered to the workers.
    pub fn close(&self) {
        let mut sender = self.sender.write().unwrap_or_else(PoisonError::into_inner);
        if sender.take().is_some() {
            debug!("Click queue closed");
        }
    }

    /// Whether [`Self::close`] or [`Self::shutdown`] ran.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Number of events waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => tx.max_capacity() - tx.capacity(),
            None => self.receiver.try_lock().map(|rx| rx.len()).unwrap_or_default(),
        }
    }

    /// Counters since creation plus the current queue depth.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            queued: self.queued(),
        }
    }

    /// Closes the queue and waits up to `grace` for the workers to drain it.
    /// Workers still running after that are aborted.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.close();

        let handles = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();

        let total = handles.len();
        let deadline = tokio::time::Instant::now() + grace;
        let mut drained = 0;
        let mut aborted = 0;

        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => drained += 1,
                Ok(Err(err)) => {
                    error!(error = %err, "Click worker ended abnormally");
                    drained += 1;
                }
                Err(_) => {
                    handle.abort();
                    aborted += 1;
                }
            }
        }

        let report = ShutdownReport {
            drained,
            aborted,
            abandoned: self.queued(),
        };

        if aborted > 0 || report.abandoned > 0 {
            warn!(
                workers = total,
                aborted,
                abandoned = report.abandoned,
                "Click workers did not drain the queue in time"
            );
        } else {
            info!(workers = total, "Click workers drained and stopped");
        }

        report
    }
}

// =====================================
// Worker Loop
// =====================================
async fn click_worker(
    worker_id: usize,
    receiver: SharedReceiver,
    store: Arc<dyn ClickStore>,
    counters: Arc<Counters>,
) {
    debug!(worker_id, "Click worker started");

    loop {
        // The lock is only held while waiting for the next event, so idle
        // workers queue up on the mutex and take events first-come.
        let next = receiver.lock().await.recv().await;
        let Some(event) = next else {
            break;
        };

        let link_id = event.link_id;
        match store.insert(Click::from(event)).await {
            Ok(()) => {
                counters.persisted.fetch_add(1, Ordering::Relaxed);
                debug!(worker_id, link_id, "Click recorded");
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(worker_id, link_id, error = %err, "Failed to save click");
            }
        }
    }

    debug!(worker_id, "Click worker stopped");
}

// =====================================
// Tests
// =====================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryClickStore, MockClickStore};
    use crate::error::StoreError;
    use crate::models::VisitorInfo;
    use std::collections::HashSet;
    use std::time::Instant;
    use tracing_test::traced_test;

    fn event(link_id: i64, n: usize) -> ClickEvent {
        ClickEvent::now(link_id, VisitorInfo::new(format!("agent-{n}"), "10.0.0.1"))
    }

    async fn wait_for_persisted(pipeline: &ClickPipeline, expected: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while pipeline.stats().persisted + pipeline.stats().failed < expected {
            assert!(Instant::now() < deadline, "workers did not catch up");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let pipeline = ClickPipeline::new(Arc::new(MemoryClickStore::new()), 4).unwrap();

        let outcomes: Vec<SubmitOutcome> = (0..10).map(|n| pipeline.submit(event(1, n))).collect();

        assert_eq!(outcomes.iter().filter(|o| o.is_enqueued()).count(), 4);
        let stats = pipeline.stats();
        assert_eq!(stats.accepted, 4);
        assert_eq!(stats.dropped, 6);
        assert_eq!(stats.queued, 4);
    }

    #[test]
    #[traced_test]
    fn test_every_drop_is_logged() {
        let pipeline = ClickPipeline::new(Arc::new(MemoryClickStore::new()), 3).unwrap();

        for n in 0..8 {
            pipeline.submit(event(1, n));
        }

        assert_eq!(pipeline.stats().dropped, 5);
        logs_assert(|lines: &[&str]| {
            let warnings = lines
                .iter()
                .filter(|line| line.contains("WARN") && line.contains("Click queue is full"))
                .count();
            match warnings {
                5 => Ok(()),
                n => Err(format!("expected 5 drop warnings, got {n}")),
            }
        });
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = ClickPipeline::new(Arc::new(MemoryClickStore::new()), 0).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_submit_after_close_is_dropped() {
        let pipeline = ClickPipeline::new(Arc::new(MemoryClickStore::new()), 4).unwrap();
        pipeline.close();

        assert_eq!(pipeline.submit(event(1, 0)), SubmitOutcome::Dropped);
        assert!(pipeline.is_closed());
    }

    #[tokio::test]
    async fn test_workers_persist_every_accepted_event_once() {
        let store = Arc::new(MemoryClickStore::new());
        let pipeline = ClickPipeline::new(store.clone(), 256).unwrap();
        pipeline.start_workers(4).unwrap();

        for n in 0..200 {
            assert!(pipeline.submit(event(7, n)).is_enqueued());
        }
        wait_for_persisted(&pipeline, 200).await;

        let clicks = store.clicks();
        assert_eq!(clicks.len(), 200);
        let agents: HashSet<_> = clicks.iter().map(|c| c.user_agent.clone()).collect();
        assert_eq!(agents.len(), 200);
    }

    #[tokio::test]
    async fn test_failed_insert_does_not_stop_worker() {
        let mut store = MockClickStore::new();
        store.expect_insert().times(3).returning(|click| {
            if click.user_agent == "agent-0" {
                Err(StoreError::Unavailable("locked".to_string()))
            } else {
                Ok(())
            }
        });

        let pipeline = ClickPipeline::new(Arc::new(store), 8).unwrap();
        pipeline.start_workers(1).unwrap();
        for n in 0..3 {
            pipeline.submit(event(1, n));
        }
        wait_for_persisted(&pipeline, 3).await;

        let stats = pipeline.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.persisted, 2);
    }

    #[tokio::test]
    async fn test_workers_start_once() {
        let pipeline = ClickPipeline::new(Arc::new(MemoryClickStore::new()), 8).unwrap();
        assert!(pipeline.start_workers(0).is_err());
        pipeline.start_workers(2).unwrap();
        assert!(matches!(pipeline.start_workers(2), Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let store = Arc::new(MemoryClickStore::new());
        let pipeline = ClickPipeline::new(store.clone(), 64).unwrap();
        for n in 0..50 {
            pipeline.submit(event(3, n));
        }
        pipeline.start_workers(2).unwrap();

        let report = pipeline.shutdown(Duration::from_secs(5)).await;

        assert_eq!(report.drained, 2);
        assert_eq!(report.aborted, 0);
        assert_eq!(report.abandoned, 0);
        assert_eq!(store.len(), 50);
    }
}
