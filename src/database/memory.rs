//! # In-Memory Stores
//!
//! Process-local [`LinkStore`] / [`ClickStore`] implementations. They keep
//! the same contract as the SQLite stores (store-assigned ids, unique short
//! codes) and are used by tests and by embedders that do not need
//! durability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ClickStore, LinkStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{Click, Link, NewLink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =====================================
// Link Store
// =====================================
#[derive(Debug, Default)]
pub struct MemoryLinkStore {
    next_id: AtomicI64,
    // keyed by short code, which doubles as the unique index
    links: Mutex<HashMap<String, Link>>,
}

impl MemoryLinkStore {
    /// Empty store; the first link gets id 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored links.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.links).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn insert(&self, link: NewLink) -> StoreResult<Link> {
        // check and insert under one lock: this is the unique index
        let mut links = lock(&self.links);
        if links.contains_key(&link.short_code) {
            return Err(StoreError::UniqueViolation(format!(
                "links.short_code '{}'",
                link.short_code
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let link = link.into_link(id);
        links.insert(link.short_code.clone(), link.clone());
        Ok(link)
    }

    async fn find_by_short_code(&self, short_code: &str) -> StoreResult<Option<Link>> {
        Ok(lock(&self.links).get(short_code).cloned())
    }

    async fn list_all(&self) -> StoreResult<Vec<Link>> {
        let mut links: Vec<Link> = lock(&self.links).values().cloned().collect();
        links.sort_by_key(|link| link.id);
        Ok(links)
    }
}

// =====================================
// Click Store
// =====================================
#[derive(Debug, Default)]
pub struct MemoryClickStore {
    clicks: Mutex<Vec<Click>>,
}

impl MemoryClickStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored click, in insertion order.
    #[must_use]
    pub fn clicks(&self) -> Vec<Click> {
        lock(&self.clicks).clone()
    }

    /// Number of stored clicks.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.clicks).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ClickStore for MemoryClickStore {
    async fn insert(&self, click: Click) -> StoreResult<()> {
        lock(&self.clicks).push(click);
        Ok(())
    }

    async fn count_by_link_id(&self, link_id: i64) -> StoreResult<u64> {
        let count = lock(&self.clicks)
            .iter()
            .filter(|click| click.link_id == link_id)
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_assigned_in_order() {
        let store = MemoryLinkStore::new();
        let a = store.insert(NewLink::new("aaaaaa", "https://a.example")).await.unwrap();
        let b = store.insert(NewLink::new("bbbbbb", "https://b.example")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        let all = store.list_all().await.unwrap();
        assert_eq!(all.iter().map(|l| l.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let store = MemoryLinkStore::new();
        store.insert(NewLink::new("aaaaaa", "https://a.example")).await.unwrap();
        let err = store
            .insert(NewLink::new("aaaaaa", "https://other.example"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(store.len(), 1);
    }
}
