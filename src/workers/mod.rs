//! # Background Workers
//!
//! Asynchronous click recording. See [`ClickPipeline`].

mod click_workers;

pub use click_workers::*;
