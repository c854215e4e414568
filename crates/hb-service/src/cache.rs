//! Summary cache with per-day single-flight builds.
//!
//! Only full local days are cached, as fragments keyed by (user, filter
//! fingerprint, day). A request splits its interval into a partial head, full
//! days and a partial tail; partial segments are built directly every time.
//!
//! Contiguous missing days are built together as one *flight*: one heartbeat
//! scan, per-day summaries, one persisting transaction. Flights are shared
//! futures registered per (user, day, fingerprint), so concurrent requests for
//! the same day wait on the same build. The registry only holds weak handles:
//! once every waiter is gone the flight is dropped with them.
//!
//! Every invalidation bumps a per-user generation. A flight started under an
//! older generation still answers its waiters but does not persist.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared, try_join_all};
use hb_core::interval::{local_date, local_midnight_to_utc};
use hb_core::{
    DaySegment, Filters, HeartbeatStore, Interval, StorageError, Summary, SummaryBuilder,
    SummaryStore, User, UserId,
};

type FlightResult = Result<Arc<Vec<Summary>>, StorageError>;
type Flight = Shared<BoxFuture<'static, FlightResult>>;

/// Attempts per flight: the first build plus one retry.
const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FlightKey {
    user: UserId,
    day: DateTime<Utc>,
    fingerprint: String,
}

impl FlightKey {
    fn new(user: &UserId, day: DateTime<Utc>, fingerprint: &str) -> Self {
        Self {
            user: user.clone(),
            day,
            fingerprint: fingerprint.to_string(),
        }
    }
}

struct FlightEntry {
    id: u64,
    flight: WeakShared<BoxFuture<'static, FlightResult>>,
}

#[derive(Default)]
struct CacheState {
    flights: Mutex<HashMap<FlightKey, FlightEntry>>,
    generations: Mutex<HashMap<UserId, u64>>,
    next_flight_id: AtomicU64,
}

impl CacheState {
    fn flights(&self) -> Result<MutexGuard<'_, HashMap<FlightKey, FlightEntry>>, StorageError> {
        self.flights
            .lock()
            .map_err(|_| StorageError::new("flight registry lock poisoned"))
    }

    fn generations(&self) -> Result<MutexGuard<'_, HashMap<UserId, u64>>, StorageError> {
        self.generations
            .lock()
            .map_err(|_| StorageError::new("generation lock poisoned"))
    }

    fn generation(&self, user: &UserId) -> Result<u64, StorageError> {
        Ok(self.generations()?.get(user).copied().unwrap_or_default())
    }

    /// Bumps the user's generation and forgets their registered flights.
    fn invalidate(&self, user: &UserId) -> Result<(), StorageError> {
        *self.generations()?.entry(user.clone()).or_insert(0) += 1;
        self.flights()?.retain(|key, _| key.user != *user);
        Ok(())
    }

    /// Removes the registry entries still pointing at flight `id`.
    fn finish(&self, id: u64) {
        if let Ok(mut flights) = self.flights() {
            flights.retain(|_, entry| entry.id != id);
        }
    }
}

/// Day-fragment cache in front of the [`SummaryBuilder`].
#[derive(Clone)]
pub struct SummaryCache {
    builder: SummaryBuilder,
    heartbeats: Arc<dyn HeartbeatStore>,
    fragments: Arc<dyn SummaryStore>,
    state: Arc<CacheState>,
}

impl SummaryCache {
    pub fn new(
        builder: SummaryBuilder,
        heartbeats: Arc<dyn HeartbeatStore>,
        fragments: Arc<dyn SummaryStore>,
    ) -> Self {
        Self {
            builder,
            heartbeats,
            fragments,
            state: Arc::new(CacheState::default()),
        }
    }

    /// Summary of `interval` for `user`, reusing and filling day fragments.
    ///
    /// Cached fragments are served even after their heartbeats were pruned.
    /// Missing days outside the user's recorded activity are empty and never
    /// built. With `recompute`, cached fragments are ignored: active days are
    /// rebuilt and overwritten, inactive ones are evicted.
    pub async fn get_or_build(
        &self,
        user: &User,
        interval: Interval,
        filters: &Filters,
        recompute: bool,
    ) -> Result<Summary, StorageError> {
        let fingerprint = filters.fingerprint();
        let active = self.active_days(user).await?;
        let is_active = |from: DateTime<Utc>, to: DateTime<Utc>| {
            active.is_some_and(|active| from < active.to && to > active.from)
        };

        let mut days = Vec::new();
        let mut partials = Vec::new();
        for segment in interval.split_by_day(user.timezone) {
            match segment {
                DaySegment::FullDay(day) => days.push(day),
                DaySegment::Partial(part) if is_active(part.from, part.to) => partials.push(part),
                DaySegment::Partial(_) => {}
            }
        }

        if recompute {
            let inactive: Vec<Interval> = days
                .iter()
                .filter(|day| !is_active(day.from, day.to))
                .copied()
                .collect();
            self.evict_days(&user.id, &fingerprint, inactive).await?;
        }

        let mut parts = self.cached_days(user, &days, &fingerprint, recompute).await?;
        let cached: HashSet<DateTime<Utc>> = parts.iter().map(|s| s.from).collect();
        let missing: Vec<Interval> = days
            .iter()
            .filter(|day| !cached.contains(&day.from) && is_active(day.from, day.to))
            .copied()
            .collect();
        tracing::debug!(
            user = %user.id,
            fingerprint = %fingerprint,
            days = days.len(),
            cached = cached.len(),
            missing = missing.len(),
            partials = partials.len(),
            "resolving summary"
        );

        if !missing.is_empty() {
            let state = Arc::clone(&self.state);
            let owner = user.id.clone();
            let generation = blocking(move || state.generation(&owner)).await?;
            let flights =
                self.join_or_start(user, generation, &missing, &fingerprint, filters, recompute)?;
            let built = try_join_all(flights).await?;
            let mut wanted: HashSet<DateTime<Utc>> = missing.iter().map(|d| d.from).collect();
            for summaries in &built {
                for summary in summaries.iter() {
                    if wanted.remove(&summary.from) {
                        parts.push(summary.clone());
                    }
                }
            }
        }

        for part in partials {
            let builder = self.builder.clone();
            let owner = user.clone();
            let filters = filters.clone();
            parts.push(blocking(move || builder.build(&owner, part, &filters)).await?);
        }

        Ok(Summary::merge(
            user.id.clone(),
            interval.from,
            interval.to,
            &parts,
        ))
    }

    /// Evicts the cached days containing `timestamps`, for every fingerprint.
    pub async fn invalidate(
        &self,
        user: &UserId,
        timestamps: &[DateTime<Utc>],
    ) -> Result<usize, StorageError> {
        let state = Arc::clone(&self.state);
        let fragments = Arc::clone(&self.fragments);
        let owner = user.clone();
        let timestamps = timestamps.to_vec();
        let evicted = blocking(move || {
            state.invalidate(&owner)?;
            let mut evicted = 0;
            for ts in timestamps {
                evicted +=
                    fragments.delete_fragments(&owner, None, ts, ts + Duration::milliseconds(1))?;
            }
            Ok(evicted)
        })
        .await?;
        tracing::debug!(user = %user, evicted, "invalidated summary days");
        Ok(evicted)
    }

    /// Evicts every cached fragment of `user`.
    pub async fn invalidate_user(&self, user: &UserId) -> Result<usize, StorageError> {
        let state = Arc::clone(&self.state);
        let fragments = Arc::clone(&self.fragments);
        let owner = user.clone();
        let evicted = blocking(move || {
            state.invalidate(&owner)?;
            fragments.delete_fragments_by_user(&owner)
        })
        .await?;
        tracing::debug!(user = %user, evicted, "invalidated all summaries");
        Ok(evicted)
    }

    /// Number of registered flights that still have waiters.
    pub fn in_flight(&self) -> usize {
        self.state.flights().map_or(0, |flights| {
            flights
                .values()
                .filter(|entry| entry.flight.upgrade().is_some())
                .map(|entry| entry.id)
                .collect::<HashSet<_>>()
                .len()
        })
    }

    /// Local days from the user's first to latest heartbeat, if any.
    async fn active_days(&self, user: &User) -> Result<Option<Interval>, StorageError> {
        let heartbeats = Arc::clone(&self.heartbeats);
        let owner = user.id.clone();
        let bounds = blocking(move || {
            let first = heartbeats.first_by_user(&owner)?;
            let latest = heartbeats.latest_by_user(&owner)?;
            Ok(first.zip(latest.map(|hb| hb.timestamp)))
        })
        .await?;

        Ok(bounds.map(|(first, latest)| {
            let tz = user.timezone;
            Interval {
                from: local_midnight_to_utc(local_date(first, tz), tz),
                to: local_midnight_to_utc(local_date(latest, tz) + Duration::days(1), tz),
            }
        }))
    }

    /// Drops this fingerprint's fragments for `days`.
    async fn evict_days(
        &self,
        user: &UserId,
        fingerprint: &str,
        days: Vec<Interval>,
    ) -> Result<(), StorageError> {
        if days.is_empty() {
            return Ok(());
        }
        let fragments = Arc::clone(&self.fragments);
        let owner = user.clone();
        let fingerprint = fingerprint.to_string();
        blocking(move || {
            for day in days {
                fragments.delete_fragments(&owner, Some(&fingerprint), day.from, day.to)?;
            }
            Ok(())
        })
        .await
    }

    async fn cached_days(
        &self,
        user: &User,
        days: &[Interval],
        fingerprint: &str,
        recompute: bool,
    ) -> Result<Vec<Summary>, StorageError> {
        let (Some(first), Some(last)) = (days.first(), days.last()) else {
            return Ok(Vec::new());
        };
        if recompute {
            return Ok(Vec::new());
        }
        let fragments = Arc::clone(&self.fragments);
        let owner = user.id.clone();
        let fingerprint = fingerprint.to_string();
        let (from, to) = (first.from, last.to);
        blocking(move || fragments.get_fragments(&owner, &fingerprint, from, to)).await
    }

    /// Joins live flights covering `missing` and starts flights for the rest.
    fn join_or_start(
        &self,
        user: &User,
        generation: u64,
        missing: &[Interval],
        fingerprint: &str,
        filters: &Filters,
        recompute: bool,
    ) -> Result<Vec<Flight>, StorageError> {
        let mut registry = self.state.flights()?;
        // Flights abandoned by every waiter never reach `finish`.
        registry.retain(|_, entry| entry.flight.upgrade().is_some());
        let mut flights = Vec::new();
        let mut joined = HashSet::new();
        let mut runs: Vec<Vec<Interval>> = Vec::new();

        for day in missing {
            let key = FlightKey::new(&user.id, day.from, fingerprint);
            let live = if recompute {
                None
            } else {
                registry
                    .get(&key)
                    .and_then(|entry| entry.flight.upgrade().map(|flight| (entry.id, flight)))
            };
            if let Some((id, flight)) = live {
                if joined.insert(id) {
                    flights.push(flight);
                }
                continue;
            }
            match runs.last_mut() {
                Some(run) if run.last().is_some_and(|last| last.to == day.from) => run.push(*day),
                Some(_) | None => runs.push(vec![*day]),
            }
        }

        for run in runs {
            let id = self.state.next_flight_id.fetch_add(1, Ordering::Relaxed);
            let job = FlightJob {
                id,
                generation,
                user: user.clone(),
                days: run,
                fingerprint: fingerprint.to_string(),
                filters: filters.clone(),
                builder: self.builder.clone(),
                fragments: Arc::clone(&self.fragments),
                state: Arc::clone(&self.state),
            };
            let keys: Vec<FlightKey> = job
                .days
                .iter()
                .map(|day| FlightKey::new(&user.id, day.from, fingerprint))
                .collect();
            let flight = job.run().boxed().shared();
            for key in keys {
                if let Some(weak) = flight.downgrade() {
                    registry.insert(key, FlightEntry { id, flight: weak });
                }
            }
            flights.push(flight);
        }
        Ok(flights)
    }
}

/// One build of a contiguous run of days.
struct FlightJob {
    id: u64,
    generation: u64,
    user: User,
    days: Vec<Interval>,
    fingerprint: String,
    filters: Filters,
    builder: SummaryBuilder,
    fragments: Arc<dyn SummaryStore>,
    state: Arc<CacheState>,
}

impl FlightJob {
    async fn run(self) -> FlightResult {
        let mut attempt = 1;
        let result = loop {
            match self.attempt().await {
                Ok(summaries) => break Ok(Arc::new(summaries)),
                Err(err) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        user = %self.user.id,
                        days = self.days.len(),
                        error = %err,
                        "summary flight failed, retrying"
                    );
                    self.evict().await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        user = %self.user.id,
                        days = self.days.len(),
                        error = %err,
                        "summary flight failed"
                    );
                    self.evict().await;
                    break Err(err);
                }
            }
        };
        self.state.finish(self.id);
        result
    }

    async fn attempt(&self) -> Result<Vec<Summary>, StorageError> {
        let builder = self.builder.clone();
        let user = self.user.clone();
        let days = self.days.clone();
        let filters = self.filters.clone();
        let summaries = blocking(move || builder.build_days(&user, &days, &filters)).await?;

        let fragments = Arc::clone(&self.fragments);
        let state = Arc::clone(&self.state);
        let owner = self.user.id.clone();
        let fingerprint = self.fingerprint.clone();
        let generation = self.generation;
        let to_store = summaries.clone();
        let stored = blocking(move || {
            // Held while writing so an invalidation cannot slip in between.
            let generations = state.generations()?;
            if generations.get(&owner).copied().unwrap_or_default() != generation {
                return Ok(false);
            }
            fragments.insert_fragments(&owner, &fingerprint, &to_store)?;
            drop(generations);
            Ok(true)
        })
        .await?;
        if !stored {
            tracing::debug!(user = %self.user.id, "discarding stale summary flight");
        }
        Ok(summaries)
    }

    /// Removes whatever this flight may have persisted.
    async fn evict(&self) {
        let (Some(first), Some(last)) = (self.days.first(), self.days.last()) else {
            return;
        };
        let fragments = Arc::clone(&self.fragments);
        let owner = self.user.id.clone();
        let fingerprint = self.fingerprint.clone();
        let (from, to) = (first.from, last.to);
        let evicted =
            blocking(move || fragments.delete_fragments(&owner, Some(&fingerprint), from, to))
                .await;
        if let Err(err) = evicted {
            tracing::warn!(user = %self.user.id, error = %err, "failed to evict partial flight");
        }
    }
}

/// Runs a store call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| StorageError::with_source("blocking task failed", err))?
}
