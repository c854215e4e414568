//! Storage capabilities the engine depends on.
//!
//! Stores are synchronous and shared across threads; async callers run them
//! on a blocking pool.

use chrono::{DateTime, Utc};

use crate::alias::{Alias, ProjectLabel};
use crate::error::StorageError;
use crate::heartbeat::{CountByUser, Heartbeat, SummaryKind, TimeByUser};
use crate::summary::Summary;
use crate::types::UserId;
use crate::user::User;

/// Durable, append-only heartbeat storage.
pub trait HeartbeatStore: Send + Sync {
    /// Stores one heartbeat. Returns `false` if it was already present.
    fn insert(&self, heartbeat: &Heartbeat) -> Result<bool, StorageError>;

    /// Stores a batch atomically. Returns how many were new.
    fn insert_batch(&self, heartbeats: &[Heartbeat]) -> Result<usize, StorageError>;

    fn count(&self) -> Result<u64, StorageError>;

    fn count_by_user(&self, user: &UserId) -> Result<u64, StorageError>;

    fn count_by_users(&self, users: &[UserId]) -> Result<Vec<CountByUser>, StorageError>;

    /// Heartbeats of `user` in `[from, to)`, ordered by timestamp then insertion.
    fn all_within(
        &self,
        user: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>, StorageError>;

    /// Earliest heartbeat time per user; users without heartbeats are omitted.
    fn first_by_users(&self, users: &[UserId]) -> Result<Vec<TimeByUser>, StorageError>;

    fn first_by_user(&self, user: &UserId) -> Result<Option<DateTime<Utc>>, StorageError>;

    fn latest_by_user(&self, user: &UserId) -> Result<Option<Heartbeat>, StorageError>;

    fn latest_by_origin_and_user(
        &self,
        origin: &str,
        user: &UserId,
    ) -> Result<Option<Heartbeat>, StorageError>;

    /// Distinct raw values of one heartbeat field for `user`, sorted.
    fn entity_set_by_user(
        &self,
        kind: SummaryKind,
        user: &UserId,
    ) -> Result<Vec<String>, StorageError>;

    /// Deletes every heartbeat older than `cutoff`. Returns the number removed.
    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// Day-aligned summary fragments, keyed by user and filter fingerprint.
pub trait SummaryStore: Send + Sync {
    /// Fragments lying entirely within `[from, to)`, ordered by start.
    fn get_fragments(
        &self,
        user: &UserId,
        fingerprint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Summary>, StorageError>;

    /// Upserts fragments in one transaction.
    fn insert_fragments(
        &self,
        user: &UserId,
        fingerprint: &str,
        fragments: &[Summary],
    ) -> Result<(), StorageError>;

    /// Deletes fragments overlapping `[from, to)`, for one fingerprint or all.
    fn delete_fragments(
        &self,
        user: &UserId,
        fingerprint: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, StorageError>;

    fn delete_fragments_by_user(&self, user: &UserId) -> Result<usize, StorageError>;
}

/// Alias rules and project labels.
pub trait AliasStore: Send + Sync {
    fn aliases_by_user(&self, user: &UserId) -> Result<Vec<Alias>, StorageError>;

    fn project_labels_by_user(&self, user: &UserId) -> Result<Vec<ProjectLabel>, StorageError>;

    /// Adds or replaces the rule for `(user, kind, raw)`.
    fn put_alias(&self, alias: &Alias) -> Result<(), StorageError>;

    /// Returns `false` if no such rule existed.
    fn delete_alias(&self, user: &UserId, kind: SummaryKind, raw: &str)
    -> Result<bool, StorageError>;

    /// Sets the single label of a project, replacing any previous one.
    fn put_project_label(&self, label: &ProjectLabel) -> Result<(), StorageError>;

    fn delete_project_label(&self, user: &UserId, project: &str) -> Result<bool, StorageError>;
}

/// User accounts with their timezone and sharing settings.
pub trait UserStore: Send + Sync {
    fn get_user(&self, user: &UserId) -> Result<Option<User>, StorageError>;

    /// Inserts or replaces a user.
    fn put_user(&self, user: &User) -> Result<(), StorageError>;

    fn list_users(&self) -> Result<Vec<User>, StorageError>;
}
