//! # Link Monitoring
//!
//! Periodic availability checks of registered long URLs. See [`UrlMonitor`].

mod prober;
mod url_monitor;

pub use prober::*;
pub use url_monitor::*;
