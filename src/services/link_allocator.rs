//! # Link Allocator
//!
//! Creates links with a store-wide unique random short code.
//!
//! Each attempt generates a candidate, checks the store for it and inserts
//! when it is free. The check and the insert are not atomic: two allocators
//! can pick the same free code at the same time. The store's unique index
//! then rejects one of the inserts, and that rejection is handled exactly
//! like a collision seen during the check.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::{
    config::ShortenerConfig,
    database::LinkStore,
    error::{AppError, Result, StoreError},
    models::{Link, NewLink},
    utils::{self, DEFAULT_SHORT_CODE_LENGTH},
};

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

// =====================================
// Link Allocator
// =====================================
#[derive(Clone)]
pub struct LinkAllocator {
    store: Arc<dyn LinkStore>,
    code_length: usize,
    max_retries: u32,
}

impl std::fmt::Debug for LinkAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkAllocator")
            .field("code_length", &self.code_length)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl LinkAllocator {
    /// Allocator with 6-character codes and 5 attempts.
    #[must_use]
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self {
            store,
            code_length: DEFAULT_SHORT_CODE_LENGTH,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Allocator using the code length and attempt count of `config`.
    #[must_use]
    pub fn from_config(store: Arc<dyn LinkStore>, config: &ShortenerConfig) -> Self {
        Self {
            store,
            code_length: config.code_length,
            max_retries: config.max_retries,
        }
    }

    /// Overrides the length of generated codes.
    #[must_use]
    pub fn with_code_length(mut self, code_length: usize) -> Self {
        self.code_length = code_length;
        self
    }

    /// Overrides the number of attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Length of generated codes.
    #[must_use]
    pub fn code_length(&self) -> usize {
        self.code_length
    }

    /// Attempts made before [`AppError::ExhaustedRetries`].
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Persists a new active link for `long_url` under a fresh short code.
    ///
    /// `long_url` is expected to be validated by the caller.
    ///
    /// # Errors
    /// - [`AppError::RandomSource`]: the entropy source failed
    /// - [`AppError::Store`]: the store failed with anything but a uniqueness conflict
    /// - [`AppError::ExhaustedRetries`]: every attempt collided
    #[instrument(skip(self))]
    pub async fn create_link(&self, long_url: &str) -> Result<Link> {
        for attempt in 1..=self.max_retries {
            let code = utils::generate_short_code(self.code_length)?;

            if self.store.find_by_short_code(&code).await?.is_some() {
                warn!(
                    short_code = %code,
                    attempt,
                    max_retries = self.max_retries,
                    "Short code already exists, retrying"
                );
                continue;
            }

            match self.store.insert(NewLink::new(&code, long_url)).await {
                Ok(link) => {
                    info!(short_code = %link.short_code, link_id = link.id, attempt, "Created link");
                    return Ok(link);
                }
                Err(StoreError::UniqueViolation(reason)) => {
                    warn!(
                        short_code = %code,
                        attempt,
                        max_retries = self.max_retries,
                        reason = %reason,
                        "Short code taken concurrently, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        debug!(attempts = self.max_retries, "Giving up on short code allocation");
        Err(AppError::ExhaustedRetries {
            attempts: self.max_retries,
        })
    }
}
