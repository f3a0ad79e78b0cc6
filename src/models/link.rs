//! # Link Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Timestamps;

// =====================================
// Link Entity
// =====================================
/// A short code → long URL mapping, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Link {
    /// Assigned by the store on insert
    pub id: i64,

    /// Random code over the 62-symbol alphabet, unique store-wide
    pub short_code: String,

    /// Destination of the redirect
    pub long_url: String,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

// =====================================
// New Link
// =====================================
/// A link about to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub short_code: String,
    pub long_url: String,
    pub is_active: bool,
    pub timestamps: Timestamps,
}

impl NewLink {
    /// Active link stamped with the current time.
    #[must_use]
    pub fn new(short_code: impl Into<String>, long_url: impl Into<String>) -> Self {
        Self {
            short_code: short_code.into(),
            long_url: long_url.into(),
            is_active: true,
            timestamps: Timestamps::now(),
        }
    }

    /// The stored form of this link once the store picked `id`.
    #[must_use]
    pub fn into_link(self, id: i64) -> Link {
        Link {
            id,
            short_code: self.short_code,
            long_url: self.long_url,
            is_active: self.is_active,
            created_at: self.timestamps.created_at,
            updated_at: self.timestamps.updated_at,
        }
    }
}
