//! Wire shapes for stats and heartbeat responses.
//!
//! Field names follow the wakatime-compatible API so existing clients can read
//! them unchanged.

use chrono::{DateTime, SecondsFormat, Utc};
use hb_core::{Filters, Heartbeat, Interval, Summary, SummaryItem, SummaryKind, User};
use serde::Serialize;

/// Response body of a stats request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsViewModel {
    pub data: StatsData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsData {
    pub user_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub range: String,
    pub timezone: String,
    pub days_including_holidays: i64,
    pub total_seconds: f64,
    pub total_seconds_including_other_language: f64,
    pub daily_average: f64,
    pub daily_average_including_other_language: f64,
    pub human_readable_total: String,
    pub human_readable_total_including_other_language: String,
    pub human_readable_daily_average: String,
    pub human_readable_daily_average_including_other_language: String,
    pub projects: Vec<StatsItem>,
    pub languages: Vec<StatsItem>,
    pub editors: Vec<StatsItem>,
    pub operating_systems: Vec<StatsItem>,
    pub machines: Vec<StatsItem>,
    pub labels: Vec<StatsItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<StatsItem>,
    pub filters: Filters,
}

/// One entry of a category breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsItem {
    pub name: String,
    pub total_seconds: f64,
    pub percent: f64,
    pub digital: String,
    pub text: String,
    pub hours: i64,
    pub minutes: i64,
}

impl StatsViewModel {
    /// Builds the view of an already redacted summary.
    pub fn new(summary: &Summary, owner: &User, range: &str, filters: &Filters) -> Self {
        let interval = Interval {
            from: summary.from,
            to: summary.to,
        };
        let days = interval.day_count();
        let total = summary.total_excluding_unknown_language();
        let total_including_other = summary.total_ms;
        let average = total / days;
        let average_including_other = total_including_other / days;
        let items = |kind| stats_items(summary.items(kind), total_including_other);

        Self {
            data: StatsData {
                user_id: owner.id.to_string(),
                start: summary.from,
                end: summary.to,
                range: range.to_string(),
                timezone: owner.timezone.name(),
                days_including_holidays: days,
                total_seconds: seconds(total),
                total_seconds_including_other_language: seconds(total_including_other),
                daily_average: seconds(average),
                daily_average_including_other_language: seconds(average_including_other),
                human_readable_total: human_duration(total),
                human_readable_total_including_other_language: human_duration(
                    total_including_other,
                ),
                human_readable_daily_average: human_duration(average),
                human_readable_daily_average_including_other_language: human_duration(
                    average_including_other,
                ),
                projects: items(SummaryKind::Project),
                languages: items(SummaryKind::Language),
                editors: items(SummaryKind::Editor),
                operating_systems: items(SummaryKind::OperatingSystem),
                machines: items(SummaryKind::Machine),
                labels: items(SummaryKind::Label),
                entities: items(SummaryKind::Entity),
                filters: filters.clone(),
            },
        }
    }
}

fn stats_items(items: &[SummaryItem], total_ms: i64) -> Vec<StatsItem> {
    items
        .iter()
        .map(|item| {
            let minutes_total = item.duration_ms / 60_000;
            StatsItem {
                name: item.key.clone(),
                total_seconds: seconds(item.duration_ms),
                percent: percent(item.duration_ms, total_ms),
                digital: digital_duration(item.duration_ms),
                text: human_duration(item.duration_ms),
                hours: minutes_total / 60,
                minutes: minutes_total % 60,
            }
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn seconds(ms: i64) -> f64 {
    ms as f64 / 1000.0
}

/// Share of `part` in `total`, in percent rounded to two decimals.
#[allow(clippy::cast_precision_loss)]
fn percent(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Formats milliseconds as wakatime-style text, e.g. "2 hrs 5 mins".
pub fn human_duration(ms: i64) -> String {
    let total_minutes = ms.max(0) / 60_000;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    let plural = |n: i64, one: &str, many: &str| {
        if n == 1 {
            format!("{n} {one}")
        } else {
            format!("{n} {many}")
        }
    };

    if hours > 0 {
        format!("{} {}", plural(hours, "hr", "hrs"), plural(minutes, "min", "mins"))
    } else {
        plural(minutes, "min", "mins")
    }
}

/// Formats milliseconds as `H:MM`.
pub fn digital_duration(ms: i64) -> String {
    let total_minutes = ms.max(0) / 60_000;
    format!("{}:{:02}", total_minutes / 60, total_minutes % 60)
}

/// Response body of a heartbeats request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatsResult {
    pub data: Vec<HeartbeatEntry>,
    pub start: String,
    pub end: String,
    pub timezone: String,
}

impl HeartbeatsResult {
    pub fn new(heartbeats: &[Heartbeat], interval: Interval, owner: &User) -> Self {
        Self {
            data: heartbeats.iter().map(HeartbeatEntry::from).collect(),
            start: interval.from.to_rfc3339_opts(SecondsFormat::Secs, true),
            end: interval.to.to_rfc3339_opts(SecondsFormat::Secs, true),
            timezone: owner.timezone.name(),
        }
    }
}

/// A stored heartbeat as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatEntry {
    pub id: String,
    pub user_id: String,
    pub entity: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub project: String,
    pub language: String,
    pub editor: String,
    pub operating_system: String,
    pub machine: String,
    pub is_write: bool,
    /// Unix time in seconds with millisecond precision.
    pub time: f64,
}

impl From<&Heartbeat> for HeartbeatEntry {
    fn from(heartbeat: &Heartbeat) -> Self {
        Self {
            id: heartbeat.id(),
            user_id: heartbeat.user_id.to_string(),
            entity: heartbeat.entity.clone(),
            entity_type: heartbeat.entity_type.as_str().to_string(),
            project: heartbeat.project.clone(),
            language: heartbeat.language.clone(),
            editor: heartbeat.editor.clone(),
            operating_system: heartbeat.operating_system.clone(),
            machine: heartbeat.machine.clone(),
            is_write: heartbeat.is_write,
            time: seconds(heartbeat.timestamp.timestamp_millis()),
        }
    }
}
