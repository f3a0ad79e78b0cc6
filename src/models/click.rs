//! # Click Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =====================================
// Click Event
// =====================================
/// An access captured on the redirect path, not yet persisted.
///
/// `link_id` is not checked for existence when the event is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub link_id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub ip_address: String,
}

impl ClickEvent {
    /// Event for `link_id` stamped with the current time.
    #[must_use]
    pub fn now(link_id: i64, visitor: VisitorInfo) -> Self {
        Self {
            link_id,
            timestamp: Utc::now(),
            user_agent: visitor.user_agent,
            ip_address: visitor.ip_address,
        }
    }
}

/// Request metadata recorded with a click.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorInfo {
    pub user_agent: String,
    pub ip_address: String,
}

impl VisitorInfo {
    #[must_use]
    pub fn new(user_agent: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ip_address: ip_address.into(),
        }
    }
}

// =====================================
// Click Record
// =====================================
/// Persisted form of a [`ClickEvent`]. Owned by the Click Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Click {
    pub link_id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub ip_address: String,
}

impl From<ClickEvent> for Click {
    fn from(event: ClickEvent) -> Self {
        Self {
            link_id: event.link_id,
            timestamp: event.timestamp,
            user_agent: event.user_agent,
            ip_address: event.ip_address,
        }
    }
}
