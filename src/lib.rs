//! # dynamic-dl
//!
//! Incremental, resumable harvester for paginated social feed content.
//!
//! ## Design Philosophy
//!
//! dynamic-dl is designed to be:
//! - **Incremental** - each run only captures what previous runs have not
//! - **Resumable** - progress lives in plain text state files next to the content
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use dynamic_dl::{Config, Harvester};
//! use dynamic_dl::config::SessionConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         owners: vec!["560647".to_string()],
//!         base_dir: "content".into(),
//!         session: SessionConfig {
//!             cookie: std::env::var("FEED_COOKIE")?,
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!
//!     let harvester = Harvester::with_http(config)?;
//!
//!     // Subscribe to events
//!     let mut events = harvester.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     harvester.crawl_all().await;
//!     harvester.retry_all().await;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## On-disk layout
//!
//! ```text
//! <base_dir>/<name>_<owner>/
//!     captured_urls.txt        one canonical URL per captured item
//!     capture_timestamps.txt   encoded publish times, newest first
//!     retry_ledger.txt         canonical URLs of items that failed
//!     txt/<time>.txt           text-only items
//!     <time>-<body>/           items with attachments (info.txt, 1.jpg, ...)
//!     null/<id>/               attachments of items without a body
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Attachment downloads
pub mod assets;
/// Item classification and artifact layout
pub mod classify;
/// Image harvesting from reply threads
pub mod comments;
/// Configuration types
pub mod config;
/// Feed walk, item processing and retry runs
pub mod crawler;
/// Error types
pub mod error;
/// Retry logic with exponential backoff
pub mod retry;
/// Persisted deduplication state and retry ledger
pub mod state;
/// Access to the remote feed source
pub mod transport;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use comments::{CommentHarvestSummary, CommentImageHarvester};
pub use config::{ClockZone, Config, DedupStrategy};
pub use crawler::Harvester;
pub use error::{Error, PersistenceError, Result, TransportError};
pub use transport::{HttpTransport, Transport};
pub use types::{
    Event, FeedOwner, FeedPage, Item, PageCursor, ProcessOutcome, RawItem, RetrySummary,
    StopReason, WalkSummary,
};
