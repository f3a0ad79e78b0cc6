//! # Store Contracts and SQLite Implementations
//!
//! The core never talks to SQL directly: it depends on [`LinkStore`] and
//! [`ClickStore`], which makes it possible to run it against fakes in tests.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::Database;
use crate::error::StoreResult;
use crate::models::{Click, Link, NewLink};

// =====================================
// Store Traits
// =====================================
/// Persistence of [`Link`]s.
///
/// Implementations handle their own concurrency; callers treat every call
/// as possibly slow and possibly failing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Inserts a link and returns it with its assigned id.
    ///
    /// Reports [`crate::error::StoreError::UniqueViolation`] when the short
    /// code is already taken.
    async fn insert(&self, link: NewLink) -> StoreResult<Link>;

    /// `Ok(None)` when no link uses `short_code`.
    async fn find_by_short_code(&self, short_code: &str) -> StoreResult<Option<Link>>;

    async fn list_all(&self) -> StoreResult<Vec<Link>>;
}

/// Persistence of [`Click`]s.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClickStore: Send + Sync {
    async fn insert(&self, click: Click) -> StoreResult<()>;

    async fn count_by_link_id(&self, link_id: i64) -> StoreResult<u64>;
}

// =====================================
// SQLite Link Store
// =====================================
/// [`LinkStore`] over the `links` table.
#[derive(Debug, Clone)]
pub struct SqliteLinkStore {
    db: Database,
}

impl SqliteLinkStore {
    /// Link store over the pool of `db`.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn insert(&self, link: NewLink) -> StoreResult<Link> {
        let result = sqlx::query(
            r#"
            INSERT INTO links (short_code, long_url, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&link.short_code)
        .bind(&link.long_url)
        .bind(link.is_active)
        .bind(link.timestamps.created_at)
        .bind(link.timestamps.updated_at)
        .execute(self.db.pool())
        .await?;

        Ok(link.into_link(result.last_insert_rowid()))
    }

    async fn find_by_short_code(&self, short_code: &str) -> StoreResult<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(
            r#"
            SELECT id, short_code, long_url, is_active, created_at, updated_at
            FROM links
            WHERE short_code = ?
            "#,
        )
        .bind(short_code)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(link)
    }

    async fn list_all(&self) -> StoreResult<Vec<Link>> {
        let links = sqlx::query_as::<_, Link>(
            r#"
            SELECT id, short_code, long_url, is_active, created_at, updated_at
            FROM links
            ORDER BY id
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(links)
    }
}

// =====================================
// SQLite Click Store
// =====================================
/// [`ClickStore`] over the `clicks` table.
#[derive(Debug, Clone)]
pub struct SqliteClickStore {
    db: Database,
}

impl SqliteClickStore {
    /// Click store over the pool of `db`.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ClickStore for SqliteClickStore {
    async fn insert(&self, click: Click) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO clicks (link_id, timestamp, user_agent, ip_address)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(click.link_id)
        .bind(click.timestamp)
        .bind(&click.user_agent)
        .bind(&click.ip_address)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn count_by_link_id(&self, link_id: i64) -> StoreResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clicks WHERE link_id = ?")
            .bind(link_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
