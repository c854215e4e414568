//! Instrumented store shared by the service integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use hb_core::{
    Alias, AliasStore, CountByUser, EntityType, Heartbeat, HeartbeatStore, ProjectLabel,
    StorageError, Summary, SummaryKind, SummaryStore, TimeByUser, User, UserId, UserStore,
    UserTimezone,
};
use hb_db::Database;
use hb_service::{ServiceConfig, SummaryCache, SummaryService};

/// In-memory database that counts heartbeat scans and can slow or fail them.
pub struct TestStore {
    pub db: Database,
    scans: AtomicUsize,
    failing_scans: AtomicUsize,
    scan_delay_ms: AtomicU64,
}

impl TestStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            db: Database::open_in_memory().unwrap(),
            scans: AtomicUsize::new(0),
            failing_scans: AtomicUsize::new(0),
            scan_delay_ms: AtomicU64::new(0),
        })
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Makes the next `n` scans fail.
    pub fn fail_next_scans(&self, n: usize) {
        self.failing_scans.store(n, Ordering::SeqCst);
    }

    pub fn set_scan_delay_ms(&self, ms: u64) {
        self.scan_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn fragments(&self, user: &UserId, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Summary> {
        self.db
            .fragments(user, hb_core::UNFILTERED, from, to)
            .unwrap()
    }
}

impl HeartbeatStore for TestStore {
    fn insert(&self, heartbeat: &Heartbeat) -> Result<bool, StorageError> {
        self.db.insert(heartbeat)
    }

    fn insert_batch(&self, heartbeats: &[Heartbeat]) -> Result<usize, StorageError> {
        self.db.insert_batch(heartbeats)
    }

    fn count(&self) -> Result<u64, StorageError> {
        self.db.count()
    }

    fn count_by_user(&self, user: &UserId) -> Result<u64, StorageError> {
        self.db.count_by_user(user)
    }

    fn count_by_users(&self, users: &[UserId]) -> Result<Vec<CountByUser>, StorageError> {
        self.db.count_by_users(users)
    }

    fn all_within(
        &self,
        user: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>, StorageError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let delay = self.scan_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(std::time::Duration::from_millis(delay));
        }
        let failing = self
            .failing_scans
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StorageError::new("injected scan failure"));
        }
        self.db.all_within(user, from, to)
    }

    fn first_by_users(&self, users: &[UserId]) -> Result<Vec<TimeByUser>, StorageError> {
        self.db.first_by_users(users)
    }

    fn first_by_user(&self, user: &UserId) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.db.first_by_user(user)
    }

    fn latest_by_user(&self, user: &UserId) -> Result<Option<Heartbeat>, StorageError> {
        self.db.latest_by_user(user)
    }

    fn latest_by_origin_and_user(
        &self,
        origin: &str,
        user: &UserId,
    ) -> Result<Option<Heartbeat>, StorageError> {
        self.db.latest_by_origin_and_user(origin, user)
    }

    fn entity_set_by_user(
        &self,
        kind: SummaryKind,
        user: &UserId,
    ) -> Result<Vec<String>, StorageError> {
        self.db.entity_set_by_user(kind, user)
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        self.db.delete_before(cutoff)
    }
}

impl SummaryStore for TestStore {
    fn get_fragments(
        &self,
        user: &UserId,
        fingerprint: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Summary>, StorageError> {
        self.db.get_fragments(user, fingerprint, from, to)
    }

    fn insert_fragments(
        &self,
        user: &UserId,
        fingerprint: &str,
        fragments: &[Summary],
    ) -> Result<(), StorageError> {
        self.db.insert_fragments(user, fingerprint, fragments)
    }

    fn delete_fragments(
        &self,
        user: &UserId,
        fingerprint: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        self.db.delete_fragments(user, fingerprint, from, to)
    }

    fn delete_fragments_by_user(&self, user: &UserId) -> Result<usize, StorageError> {
        self.db.delete_fragments_by_user(user)
    }
}

impl AliasStore for TestStore {
    fn aliases_by_user(&self, user: &UserId) -> Result<Vec<Alias>, StorageError> {
        self.db.aliases_by_user(user)
    }

    fn project_labels_by_user(&self, user: &UserId) -> Result<Vec<ProjectLabel>, StorageError> {
        self.db.project_labels_by_user(user)
    }

    fn put_alias(&self, alias: &Alias) -> Result<(), StorageError> {
        self.db.put_alias(alias)
    }

    fn delete_alias(
        &self,
        user: &UserId,
        kind: SummaryKind,
        raw: &str,
    ) -> Result<bool, StorageError> {
        self.db.delete_alias(user, kind, raw)
    }

    fn put_project_label(&self, label: &ProjectLabel) -> Result<(), StorageError> {
        self.db.put_project_label(label)
    }

    fn delete_project_label(&self, user: &UserId, project: &str) -> Result<bool, StorageError> {
        self.db.delete_project_label(user, project)
    }
}

impl UserStore for TestStore {
    fn get_user(&self, user: &UserId) -> Result<Option<User>, StorageError> {
        self.db.get_user(user)
    }

    fn put_user(&self, user: &User) -> Result<(), StorageError> {
        self.db.put_user(user)
    }

    fn list_users(&self) -> Result<Vec<User>, StorageError> {
        self.db.list_users()
    }
}

pub fn alice() -> UserId {
    UserId::new("alice").unwrap()
}

pub fn user(tz: UserTimezone) -> User {
    User::new(alice(), tz)
}

/// Midnight UTC of a day in March 2024.
pub fn day(d: u32) -> DateTime<Utc> {
    at(d, 0, 0)
}

pub fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
}

pub fn heartbeat(ts: DateTime<Utc>, project: &str, language: &str) -> Heartbeat {
    Heartbeat {
        user_id: alice(),
        timestamp: ts,
        project: project.to_string(),
        language: language.to_string(),
        editor: "helix".to_string(),
        operating_system: "Linux".to_string(),
        machine: "desktop".to_string(),
        entity: format!("/src/{project}/main.rs"),
        entity_type: EntityType::File,
        is_write: false,
        origin: None,
    }
}

/// Ten minutes of `hb` work in Rust at 09:00 on each of March 4th to 6th.
pub fn seed_three_days(store: &TestStore) {
    let mut batch = Vec::new();
    for d in 4..=6 {
        for m in [0, 5, 10] {
            batch.push(heartbeat(at(d, 9, m), "hb", "Rust"));
        }
    }
    store.db.insert_heartbeats(&batch).unwrap();
}

pub fn cache(store: &Arc<TestStore>) -> SummaryCache {
    service(store).cache().clone()
}

pub fn service(store: &Arc<TestStore>) -> SummaryService {
    SummaryService::from_store(Arc::clone(store), ServiceConfig::default())
}
