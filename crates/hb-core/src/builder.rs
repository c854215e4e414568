//! Summary building.
//!
//! Turns a user's heartbeats into a [`Summary`].
//!
//! # Algorithm
//!
//! 1. Canonicalize every heartbeat through the user's aliases (empty fields
//!    become `unknown`) and attach the canonical project's label
//! 2. Drop heartbeats that fail the filters, then stable-sort by timestamp
//! 3. Walk consecutive pairs: a gap of at most the idle timeout that stays on
//!    the same local day is credited to the earlier heartbeat's context;
//!    any other gap contributes nothing
//! 4. Credited gaps with an unchanged context merge into one span
//! 5. Every span counts towards each category under its canonical key

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;

use crate::alias::{AliasResolver, ProjectLabels};
use crate::error::StorageError;
use crate::filters::Filters;
use crate::heartbeat::{Heartbeat, SummaryKind, UNKNOWN_LABEL};
use crate::interval::{Interval, local_date};
use crate::store::{AliasStore, HeartbeatStore};
use crate::summary::{Summary, into_sorted_items};
use crate::types::{UserId, UserTimezone};
use crate::user::User;

/// Configuration for summary building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryConfig {
    /// Longest gap between heartbeats still counted as continuous activity.
    /// Default: 600000 (10 minutes).
    pub idle_timeout_ms: i64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 600_000, // 10 minutes
        }
    }
}

/// The canonical values a heartbeat is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityContext {
    pub project: String,
    pub language: String,
    pub editor: String,
    pub operating_system: String,
    pub machine: String,
    pub entity: String,
    pub label: Option<String>,
}

impl ActivityContext {
    pub fn value(&self, kind: SummaryKind) -> Option<&str> {
        match kind {
            SummaryKind::Project => Some(&self.project),
            SummaryKind::Language => Some(&self.language),
            SummaryKind::Editor => Some(&self.editor),
            SummaryKind::OperatingSystem => Some(&self.operating_system),
            SummaryKind::Machine => Some(&self.machine),
            SummaryKind::Entity => Some(&self.entity),
            SummaryKind::Label => self.label.as_deref(),
        }
    }
}

/// Per-user lookups needed to canonicalize heartbeats.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub aliases: AliasResolver,
    pub labels: ProjectLabels,
    pub timezone: UserTimezone,
}

impl BuildContext {
    pub fn canonicalize(&self, heartbeat: &Heartbeat) -> ActivityContext {
        let canonical = |kind: SummaryKind| {
            let raw = heartbeat.field(kind).unwrap_or_default();
            let value = self.aliases.canonicalize(kind, raw);
            if value.trim().is_empty() {
                UNKNOWN_LABEL.to_string()
            } else {
                value.to_string()
            }
        };
        let project = canonical(SummaryKind::Project);
        let label = self.labels.label_for(&project).map(str::to_string);
        ActivityContext {
            language: canonical(SummaryKind::Language),
            editor: canonical(SummaryKind::Editor),
            operating_system: canonical(SummaryKind::OperatingSystem),
            machine: canonical(SummaryKind::Machine),
            entity: canonical(SummaryKind::Entity),
            project,
            label,
        }
    }
}

/// A continuous stretch of activity in one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub context: ActivityContext,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }
}

/// Collapses timestamp-ordered activity into spans.
///
/// A heartbeat with no successor within the idle timeout contributes nothing.
pub fn collapse_spans(
    activity: &[(DateTime<Utc>, ActivityContext)],
    timezone: UserTimezone,
    config: &SummaryConfig,
) -> Vec<Span> {
    let idle_timeout = Duration::milliseconds(config.idle_timeout_ms);
    let mut spans: Vec<Span> = Vec::new();

    for pair in activity.windows(2) {
        let (start, context) = &pair[0];
        let (end, _) = &pair[1];
        let gap = *end - *start;
        if gap <= Duration::zero()
            || gap > idle_timeout
            || local_date(*start, timezone) != local_date(*end, timezone)
        {
            continue;
        }

        if let Some(last) = spans.last_mut() {
            if last.end == *start && last.context == *context {
                last.end = *end;
                continue;
            }
        }
        spans.push(Span {
            context: context.clone(),
            start: *start,
            end: *end,
        });
    }
    spans
}

/// Builds a summary for `interval` from already fetched heartbeats.
///
/// Heartbeats outside `interval` are ignored; input order does not matter
/// beyond breaking timestamp ties.
pub fn summarize(
    user: &UserId,
    interval: Interval,
    heartbeats: &[Heartbeat],
    context: &BuildContext,
    filters: &Filters,
    config: &SummaryConfig,
) -> Summary {
    let activity = prepare(heartbeats, interval, context, filters);
    aggregate(user, interval, &activity, context.timezone, config)
}

/// Builds one summary per day from a single heartbeat scan.
///
/// `days` must be ordered and non-overlapping. Days are built in parallel.
pub fn summarize_days(
    user: &UserId,
    days: &[Interval],
    heartbeats: &[Heartbeat],
    context: &BuildContext,
    filters: &Filters,
    config: &SummaryConfig,
) -> Vec<Summary> {
    let (Some(first), Some(last)) = (days.first(), days.last()) else {
        return Vec::new();
    };
    let range = Interval {
        from: first.from,
        to: last.to,
    };
    let activity = prepare(heartbeats, range, context, filters);

    days.par_iter()
        .map(|day| {
            let lo = activity.partition_point(|(ts, _)| *ts < day.from);
            let hi = activity.partition_point(|(ts, _)| *ts < day.to);
            aggregate(user, *day, &activity[lo..hi], context.timezone, config)
        })
        .collect()
}

fn prepare(
    heartbeats: &[Heartbeat],
    range: Interval,
    context: &BuildContext,
    filters: &Filters,
) -> Vec<(DateTime<Utc>, ActivityContext)> {
    let mut activity: Vec<_> = heartbeats
        .iter()
        .filter(|hb| range.contains(hb.timestamp))
        .map(|hb| (hb.timestamp, context.canonicalize(hb)))
        .filter(|(_, ctx)| filters.matches(ctx))
        .collect();
    // Stable: equal timestamps keep insertion order.
    activity.sort_by_key(|(ts, _)| *ts);
    activity
}

fn aggregate(
    user: &UserId,
    interval: Interval,
    activity: &[(DateTime<Utc>, ActivityContext)],
    timezone: UserTimezone,
    config: &SummaryConfig,
) -> Summary {
    let spans = collapse_spans(activity, timezone, config);

    let mut totals: HashMap<SummaryKind, HashMap<&str, i64>> = HashMap::new();
    let mut total_ms = 0;
    for span in &spans {
        let ms = span.duration_ms();
        total_ms += ms;
        for kind in SummaryKind::ALL {
            if let Some(key) = span.context.value(kind) {
                *totals.entry(kind).or_default().entry(key).or_insert(0) += ms;
            }
        }
    }

    let mut summary = Summary::empty(user.clone(), interval.from, interval.to);
    summary.total_ms = total_ms;
    for (kind, acc) in totals {
        *summary.items_mut(kind) =
            into_sorted_items(acc.into_iter().map(|(key, ms)| (key.to_string(), ms)));
    }
    summary
}

/// Builds summaries straight from the stores.
#[derive(Clone)]
pub struct SummaryBuilder {
    heartbeats: Arc<dyn HeartbeatStore>,
    aliases: Arc<dyn AliasStore>,
    config: SummaryConfig,
}

impl SummaryBuilder {
    pub fn new(
        heartbeats: Arc<dyn HeartbeatStore>,
        aliases: Arc<dyn AliasStore>,
        config: SummaryConfig,
    ) -> Self {
        Self {
            heartbeats,
            aliases,
            config,
        }
    }

    pub const fn config(&self) -> &SummaryConfig {
        &self.config
    }

    /// Loads the user's aliases and project labels.
    pub fn load_context(&self, user: &User) -> Result<BuildContext, StorageError> {
        let aliases = self.aliases.aliases_by_user(&user.id)?;
        let labels = self.aliases.project_labels_by_user(&user.id)?;
        Ok(BuildContext {
            aliases: AliasResolver::new(&aliases),
            labels: ProjectLabels::new(&labels),
            timezone: user.timezone,
        })
    }

    /// Builds a summary for `interval` with one heartbeat scan.
    pub fn build(
        &self,
        user: &User,
        interval: Interval,
        filters: &Filters,
    ) -> Result<Summary, StorageError> {
        let context = self.load_context(user)?;
        let heartbeats = self
            .heartbeats
            .all_within(&user.id, interval.from, interval.to)?;
        tracing::debug!(
            user = %user.id,
            from = %interval.from,
            to = %interval.to,
            heartbeats = heartbeats.len(),
            "building summary"
        );
        Ok(summarize(
            &user.id,
            interval,
            &heartbeats,
            &context,
            filters,
            &self.config,
        ))
    }

    /// Builds one summary per day with a single heartbeat scan over all days.
    pub fn build_days(
        &self,
        user: &User,
        days: &[Interval],
        filters: &Filters,
    ) -> Result<Vec<Summary>, StorageError> {
        let (Some(first), Some(last)) = (days.first(), days.last()) else {
            return Ok(Vec::new());
        };
        let context = self.load_context(user)?;
        let heartbeats = self.heartbeats.all_within(&user.id, first.from, last.to)?;
        tracing::debug!(
            user = %user.id,
            days = days.len(),
            heartbeats = heartbeats.len(),
            "building day summaries"
        );
        Ok(summarize_days(
            &user.id,
            days,
            &heartbeats,
            &context,
            filters,
            &self.config,
        ))
    }
}
