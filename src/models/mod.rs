//! # Domain Models
//!
//! - **Entities**: rows owned by the stores ([`Link`], [`Click`])
//! - **Events**: in-memory values produced on the request path ([`ClickEvent`])
//! - **DTOs**: input/output of the service layer ([`CreateLinkRequest`], [`LinkStats`])

mod click;
mod dto;
mod link;

pub use click::*;
pub use dto::*;
pub use link::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =====================================
// Timestamps
// =====================================
/// Creation / update timestamps of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Timestamps {
    /// Both timestamps set to the current time.
    #[must_use]
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::now()
    }
}
