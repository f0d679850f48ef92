//! Article extraction, resource downloads, and the concurrent fetch coordinator.
//!
//! This crate provides:
//! - [`extract`]: client for the readable-text extraction service
//! - [`download`]: image/cover downloader with atomic writes
//! - [`engine`]: fan-out/fan-in coordinator over a [`LinkSet`](paperboy_shared::LinkSet)
//! - [`rate_limit`]: request start pacing

pub mod client;
pub mod download;
pub mod engine;
pub mod extract;
pub mod rate_limit;

pub use client::{USER_AGENT, build_client};
pub use download::Downloader;
pub use engine::{FetchCoordinator, FetchObserver, FetchReport};
pub use extract::ExtractionClient;
pub use rate_limit::RateLimiter;
