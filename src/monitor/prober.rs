//! # Liveness Probes
//!
//! A probe answers one question about a long URL: does it respond with a
//! 2xx or 3xx status within the timeout? Anything else (transport error,
//! timeout, 4xx, 5xx) is [`Accessibility::Inaccessible`]. Probes never
//! return errors.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ResultExt};

/// Default hard timeout of one probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// =====================================
// Accessibility
// =====================================
/// Outcome of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Accessibility {
    Accessible,
    Inaccessible,
}

impl Accessibility {
    /// 200..=399 is accessible.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        if (200..400).contains(&status) {
            Self::Accessible
        } else {
            Self::Inaccessible
        }
    }

    #[must_use]
    pub fn is_accessible(self) -> bool {
        matches!(self, Self::Accessible)
    }

    /// Upper-case name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accessible => "ACCESSIBLE",
            Self::Inaccessible => "INACCESSIBLE",
        }
    }
}

impl std::fmt::Display for Accessibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =====================================
// Prober Trait
// =====================================
#[async_trait]
pub trait LivenessProber: Send + Sync {
    /// Classifies `url`, giving up after `timeout`.
    async fn probe(&self, url: &str, timeout: Duration) -> Accessibility;
}

// =====================================
// HTTP Prober
// =====================================
/// Sends a `HEAD` request and looks at the final status code.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// # Errors
    /// Fails if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_internal()?;

        Ok(Self { client })
    }

    /// Prober over a preconfigured client (proxies, custom TLS).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LivenessProber for HttpProber {
    async fn probe(&self, url: &str, timeout: Duration) -> Accessibility {
        match self.client.head(url).timeout(timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let state = Accessibility::from_status(status);
                debug!(url = %url, status, state = %state, "Probed URL");
                state
            }
            Err(err) => {
                debug!(url = %url, error = %err, timed_out = err.is_timeout(), "URL not reachable");
                Accessibility::Inaccessible
            }
        }
    }
}
