//! # Services
//!
//! ```text
//! ┌──────────────────┐
//! │   LinkService    │  create / resolve / stats
//! ├──────────────────┤
//! │  LinkAllocator   │  unique short codes
//! │  ClickPipeline   │  background click recording
//! │  UrlMonitor      │  periodic availability checks
//! ├──────────────────┤
//! │ LinkStore /      │
//! │ ClickStore       │  SQLite or in-memory
//! └──────────────────┘
//! ```
//!
//! [`AppState`] wires everything from a [`Config`] and owns the background
//! tasks' entry points.

mod link_allocator;
mod link_service;

pub use link_allocator::*;
pub use link_service::*;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::{
    config::Config,
    database::{ClickStore, Database, LinkStore, SqliteClickStore, SqliteLinkStore},
    error::Result,
    models::{ClickEvent, Link},
    monitor::{LivenessProber, MonitorHandle, UrlMonitor},
    workers::{ClickPipeline, ShutdownReport, SubmitOutcome},
};

// =====================================
// Application State
// =====================================
/// Shared handles to the core components.
///
/// Cloning only clones `Arc`s.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub links: LinkService,
    pub allocator: LinkAllocator,
    pub pipeline: Arc<ClickPipeline>,
    pub monitor: Arc<UrlMonitor>,
}

impl AppState {
    /// State backed by the SQLite stores of `db`.
    ///
    /// # Errors
    /// Returns [`crate::AppError::Config`] if `config` does not validate.
    pub fn new(db: Database, config: Config, prober: Arc<dyn LivenessProber>) -> Result<Self> {
        let link_store: Arc<dyn LinkStore> = Arc::new(SqliteLinkStore::new(db.clone()));
        let click_store: Arc<dyn ClickStore> = Arc::new(SqliteClickStore::new(db));

        Self::with_stores(config, link_store, click_store, prober)
    }

    /// State over arbitrary store implementations.
    ///
    /// # Errors
    /// Returns [`crate::AppError::Config`] if `config` does not validate.
    pub fn with_stores(
        config: Config,
        link_store: Arc<dyn LinkStore>,
        click_store: Arc<dyn ClickStore>,
        prober: Arc<dyn LivenessProber>,
    ) -> Result<Self> {
        config.validate()?;

        let allocator = LinkAllocator::from_config(link_store.clone(), &config.shortener);
        let pipeline = Arc::new(ClickPipeline::new(
            click_store.clone(),
            config.analytics.buffer_size,
        )?);
        let monitor = Arc::new(
            UrlMonitor::new(link_store.clone(), prober).with_probe_timeout(config.probe_timeout()),
        );
        let links = LinkService::new(allocator.clone(), link_store, click_store, pipeline.clone());

        Ok(Self {
            config: Arc::new(config),
            links,
            allocator,
            pipeline,
            monitor,
        })
    }

    /// The validated configuration the state was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocates a link for an already validated URL.
    ///
    /// # Errors
    /// See [`LinkAllocator::create_link`].
    pub async fn create_link(&self, long_url: &str) -> Result<Link> {
        self.allocator.create_link(long_url).await
    }

    /// Hands a click to the ingestion pipeline without waiting.
    pub fn submit_click(&self, event: ClickEvent) -> SubmitOutcome {
        self.pipeline.submit(event)
    }

    /// Starts `count` click workers.
    ///
    /// # Errors
    /// Fails if `count` is 0 or the workers already run.
    pub fn start_ingestion_workers(&self, count: usize) -> Result<()> {
        self.pipeline.start_workers(count)
    }

    /// Starts the availability monitor with a sweep every `interval`.
    ///
    /// # Errors
    /// Fails if `interval` is zero.
    pub fn start_monitor(&self, interval: Duration) -> Result<MonitorHandle> {
        self.monitor.clone().start(interval)
    }

    /// Stops the monitor, then lets the click workers drain for the
    /// configured grace period.
    pub async fn shutdown(&self, monitor: Option<MonitorHandle>) -> ShutdownReport {
        if let Some(handle) = monitor {
            handle.stop().await;
        }

        let report = self.pipeline.shutdown(self.config.shutdown_grace()).await;
        let stats = self.pipeline.stats();
        info!(
            accepted = stats.accepted,
            dropped = stats.dropped,
            persisted = stats.persisted,
            failed = stats.failed,
            "Click pipeline totals"
        );
        report
    }
}
