//! # Database Layer
//!
//! The Link Store and Click Store collaborators.
//!
//! - [`LinkStore`] / [`ClickStore`]: the contracts the core depends on
//! - [`SqliteLinkStore`] / [`SqliteClickStore`]: sqlx-backed implementations
//! - [`MemoryLinkStore`] / [`MemoryClickStore`]: in-process implementations
//!
//! Both families are safe to share between tasks behind an `Arc`.

mod memory;
mod repository;

pub use memory::*;
pub use repository::*;

use std::sync::Arc;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::error::Result;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

// =====================================
// Database Connection
// =====================================
/// Connection pool shared by the SQLite stores.
///
/// Cloning only bumps the `Arc` count.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Arc<SqlitePool>,
}

impl Database {
    /// Connects to `database_url`, creating the parent directory of a file
    /// database if needed.
    ///
    /// # Errors
    /// Fails if the directory cannot be created or the pool cannot connect.
    pub async fn connect(database_url: impl AsRef<str>) -> Result<Self> {
        let url = database_url.as_ref();
        if let Some(path) = url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .connect(url)
            .await?;

        debug!(url = %url, "Connected to database");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Private in-memory database with the schema applied.
    ///
    /// Single connection that never idles out, otherwise the data would
    /// vanish with it.
    ///
    /// # Errors
    /// Fails if SQLite cannot open the database or the migrations fail.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self {
            pool: Arc::new(pool),
        };
        db.migrate().await?;
        Ok(db)
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    /// Fails if a migration cannot be applied.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&*self.pool).await?;
        Ok(())
    }

    /// Underlying sqlx pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Waits for pooled connections to close.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
