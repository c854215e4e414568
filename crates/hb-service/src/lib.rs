//! Async service layer for heartbeat summaries.
//!
//! Wraps the synchronous stores from `hb-core` with:
//! - [`SummaryCache`]: day-fragment caching with per-day single-flight builds
//! - [`SummaryService`]: stats and heartbeat queries, ingestion, and the
//!   mutations that evict cached days
//! - [`view`]: the response shapes handed to clients
//!
//! Every store call runs on tokio's blocking pool.

mod cache;
mod service;
mod stats;
pub mod view;

pub use cache::SummaryCache;
pub use service::{ServiceConfig, SummaryService};
pub use stats::{CURRENT_USER, HeartbeatsError, StatsError, StatsQuery};
pub use view::{HeartbeatEntry, HeartbeatsResult, StatsData, StatsItem, StatsViewModel};
