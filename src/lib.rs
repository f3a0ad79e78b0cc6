//! # Link Shortener Core
//!
//! Short code allocation, asynchronous click ingestion and availability
//! monitoring for a URL shortener. HTTP routing is left to the embedding
//! application.
//!
//! ## Layout
//!
//! ```text
//! src/
//! ├── lib.rs          # library entry point
//! ├── main.rs         # runtime host (workers + monitor)
//! ├── config/         # settings
//! ├── error/          # error types
//! ├── database/       # Link Store / Click Store (SQLite, in-memory)
//! ├── models/         # entities, events, DTOs
//! ├── services/       # allocator, link service, app state
//! ├── workers/        # click ingestion pipeline
//! ├── monitor/        # availability monitor
//! └── utils/          # code generator, validation helpers
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use link_shortener::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> link_shortener::Result<()> {
//!     let config = Config::load()?;
//!     let db = Database::connect(&config.database_url).await?;
//!     db.migrate().await?;
//!
//!     let state = AppState::new(db, config, Arc::new(HttpProber::new()?))?;
//!     state.start_ingestion_workers(state.config.analytics.worker_count)?;
//!
//!     let link = state.links.create_link(CreateLinkRequest::new("https://example.com")).await?;
//!     println!("{}", link.short_code);
//!     Ok(())
//! }
//! ```

// =====================================
// Module Declarations
// =====================================

pub mod config;

pub mod error;

pub mod database;

pub mod models;

pub mod services;

pub mod workers;

pub mod monitor;

pub mod utils;

// =====================================
// Re-exports
// =====================================

pub use error::Result;

pub use error::AppError;

// =====================================
// Prelude Module
// =====================================
/// Frequently used items.
///
/// ```rust
/// use link_shortener::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::database::{ClickStore, Database, LinkStore};
    pub use crate::error::{AppError, Result};
    pub use crate::models::*;
    pub use crate::monitor::{Accessibility, HttpProber, LivenessProber, UrlMonitor};
    pub use crate::services::*;
    pub use crate::workers::{ClickPipeline, SubmitOutcome};
}
