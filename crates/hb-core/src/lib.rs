//! Core domain logic for heartbeat summaries.
//!
//! This crate contains the fundamental types and logic for:
//! - Interval resolution: range tokens to `[from, to)` in the user's timezone
//! - Alias resolution: folding raw names into canonical ones
//! - Summary building: collapsing heartbeats into per-category durations
//! - Sharing: redacting summaries for non-owners
//!
//! Storage is abstracted behind the traits in [`store`].

mod alias;
mod builder;
mod error;
mod filters;
mod heartbeat;
pub mod interval;
mod sharing;
pub mod store;
mod summary;
mod types;
mod user;

pub use alias::{Alias, AliasResolver, ProjectLabel, ProjectLabels};
pub use builder::{
    ActivityContext, BuildContext, Span, SummaryBuilder, SummaryConfig, collapse_spans,
    summarize, summarize_days,
};
pub use error::{StorageError, SummaryError};
pub use filters::{Filters, UNFILTERED};
pub use heartbeat::{CountByUser, EntityType, Heartbeat, SummaryKind, TimeByUser, UNKNOWN_LABEL};
pub use interval::{DaySegment, Interval, NamedRange, RangeSpec, resolve_interval};
pub use sharing::{apply_sharing, check_share_window};
pub use store::{AliasStore, HeartbeatStore, SummaryStore, UserStore};
pub use summary::{Summary, SummaryItem};
pub use types::{UserId, UserTimezone, ValidationError};
pub use user::User;
