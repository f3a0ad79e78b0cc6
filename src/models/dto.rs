//! # Data Transfer Objects
//!
//! Input and output of the link service.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::Link;

// =====================================
// Requests
// =====================================
/// Request to shorten a URL.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateLinkRequest {
    #[validate(url(message = "Invalid URL format"))]
    #[validate(length(max = 2048, message = "URL is too long"))]
    pub long_url: String,
}

impl CreateLinkRequest {
    /// Request for `long_url`; validated by the link service.
    #[must_use]
    pub fn new(long_url: impl Into<String>) -> Self {
        Self {
            long_url: long_url.into(),
        }
    }
}

// =====================================
// Responses
// =====================================
/// A link together with its recorded click count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStats {
    pub link: Link,
    pub total_clicks: u64,
}
