//! The service facade: queries, ingestion and the mutations that evict.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hb_core::{
    Alias, AliasStore, Heartbeat, HeartbeatStore, ProjectLabel, RangeSpec, StorageError,
    SummaryBuilder, SummaryConfig, SummaryKind, SummaryStore, User, UserId, UserStore,
};

use crate::cache::{SummaryCache, blocking};

/// Service-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    pub summary: SummaryConfig,
    /// Range used when a stats request names none.
    pub default_range: RangeSpec,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            summary: SummaryConfig::default(),
            default_range: RangeSpec::Named(hb_core::NamedRange::Last7Days),
        }
    }
}

/// Entry point for stats, heartbeats and every write that affects summaries.
#[derive(Clone)]
pub struct SummaryService {
    pub(crate) users: Arc<dyn UserStore>,
    pub(crate) heartbeats: Arc<dyn HeartbeatStore>,
    pub(crate) aliases: Arc<dyn AliasStore>,
    pub(crate) cache: SummaryCache,
    pub(crate) config: ServiceConfig,
}

impl SummaryService {
    pub fn new(
        users: Arc<dyn UserStore>,
        heartbeats: Arc<dyn HeartbeatStore>,
        fragments: Arc<dyn SummaryStore>,
        aliases: Arc<dyn AliasStore>,
        config: ServiceConfig,
    ) -> Self {
        let builder = SummaryBuilder::new(
            Arc::clone(&heartbeats),
            Arc::clone(&aliases),
            config.summary,
        );
        let cache = SummaryCache::new(builder, Arc::clone(&heartbeats), fragments);
        Self {
            users,
            heartbeats,
            aliases,
            cache,
            config,
        }
    }

    /// Wires every store from one backend.
    pub fn from_store<S>(store: Arc<S>, config: ServiceConfig) -> Self
    where
        S: UserStore + HeartbeatStore + SummaryStore + AliasStore + 'static,
    {
        let users: Arc<dyn UserStore> = store.clone();
        let heartbeats: Arc<dyn HeartbeatStore> = store.clone();
        let fragments: Arc<dyn SummaryStore> = store.clone();
        Self::new(users, heartbeats, fragments, store, config)
    }

    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub const fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    pub async fn user(&self, id: &UserId) -> Result<Option<User>, StorageError> {
        let users = Arc::clone(&self.users);
        let id = id.clone();
        blocking(move || users.get_user(&id)).await
    }

    pub async fn users(&self) -> Result<Vec<User>, StorageError> {
        let users = Arc::clone(&self.users);
        blocking(move || users.list_users()).await
    }

    /// Creates or updates a user.
    ///
    /// A timezone change moves every local midnight, so the user's cached days
    /// are evicted.
    pub async fn put_user(&self, user: User) -> Result<(), StorageError> {
        let previous = self.user(&user.id).await?;
        let id = user.id.clone();
        let users = Arc::clone(&self.users);
        let tz_changed = previous.is_some_and(|prev| prev.timezone != user.timezone);
        blocking(move || users.put_user(&user)).await?;
        if tz_changed {
            self.cache.invalidate_user(&id).await?;
        }
        Ok(())
    }

    /// Stores a batch and evicts the cached days it lands in.
    ///
    /// Returns the number of heartbeats that were new.
    pub async fn insert_heartbeats(&self, batch: Vec<Heartbeat>) -> Result<usize, StorageError> {
        let mut touched: BTreeMap<UserId, Vec<DateTime<Utc>>> = BTreeMap::new();
        for heartbeat in &batch {
            touched
                .entry(heartbeat.user_id.clone())
                .or_default()
                .push(heartbeat.timestamp);
        }

        let heartbeats = Arc::clone(&self.heartbeats);
        let inserted = blocking(move || heartbeats.insert_batch(&batch)).await?;
        for (user, timestamps) in touched {
            self.cache.invalidate(&user, &timestamps).await?;
        }
        tracing::info!(inserted, "stored heartbeats");
        Ok(inserted)
    }

    /// Deletes heartbeats older than `cutoff`. Cached summaries are kept.
    pub async fn prune(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let heartbeats = Arc::clone(&self.heartbeats);
        let deleted = blocking(move || heartbeats.delete_before(cutoff)).await?;
        tracing::info!(deleted, %cutoff, "pruned heartbeats");
        Ok(deleted)
    }

    pub async fn aliases(&self, user: &UserId) -> Result<Vec<Alias>, StorageError> {
        let aliases = Arc::clone(&self.aliases);
        let user = user.clone();
        blocking(move || aliases.aliases_by_user(&user)).await
    }

    pub async fn put_alias(&self, alias: Alias) -> Result<(), StorageError> {
        let user = alias.user_id.clone();
        let aliases = Arc::clone(&self.aliases);
        blocking(move || aliases.put_alias(&alias)).await?;
        self.cache.invalidate_user(&user).await?;
        Ok(())
    }

    pub async fn delete_alias(
        &self,
        user: &UserId,
        kind: SummaryKind,
        raw: &str,
    ) -> Result<bool, StorageError> {
        let aliases = Arc::clone(&self.aliases);
        let owner = user.clone();
        let raw = raw.to_string();
        let deleted = blocking(move || aliases.delete_alias(&owner, kind, &raw)).await?;
        if deleted {
            self.cache.invalidate_user(user).await?;
        }
        Ok(deleted)
    }

    pub async fn project_labels(&self, user: &UserId) -> Result<Vec<ProjectLabel>, StorageError> {
        let aliases = Arc::clone(&self.aliases);
        let user = user.clone();
        blocking(move || aliases.project_labels_by_user(&user)).await
    }

    pub async fn put_project_label(&self, label: ProjectLabel) -> Result<(), StorageError> {
        let user = label.user_id.clone();
        let aliases = Arc::clone(&self.aliases);
        blocking(move || aliases.put_project_label(&label)).await?;
        self.cache.invalidate_user(&user).await?;
        Ok(())
    }

    pub async fn delete_project_label(
        &self,
        user: &UserId,
        project: &str,
    ) -> Result<bool, StorageError> {
        let aliases = Arc::clone(&self.aliases);
        let owner = user.clone();
        let project = project.to_string();
        let deleted = blocking(move || aliases.delete_project_label(&owner, &project)).await?;
        if deleted {
            self.cache.invalidate_user(user).await?;
        }
        Ok(deleted)
    }
}
