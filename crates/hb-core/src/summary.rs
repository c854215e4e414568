//! Aggregated summaries and fragment merging.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::heartbeat::{SummaryKind, UNKNOWN_LABEL};
use crate::types::UserId;

/// Total tracked time for one canonical label within a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub key: String,
    pub duration_ms: i64,
}

impl SummaryItem {
    pub fn new(key: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            key: key.into(),
            duration_ms,
        }
    }
}

/// Aggregated durations per category over `[from, to)`.
///
/// Every category is sorted by descending duration, ties by key ascending,
/// and never contains zero-duration items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub user_id: UserId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(default)]
    pub projects: Vec<SummaryItem>,
    #[serde(default)]
    pub languages: Vec<SummaryItem>,
    #[serde(default)]
    pub editors: Vec<SummaryItem>,
    #[serde(default)]
    pub operating_systems: Vec<SummaryItem>,
    #[serde(default)]
    pub machines: Vec<SummaryItem>,
    #[serde(default)]
    pub labels: Vec<SummaryItem>,
    #[serde(default)]
    pub entities: Vec<SummaryItem>,
    pub total_ms: i64,
}

impl Summary {
    /// An empty summary for the given range.
    pub const fn empty(user_id: UserId, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            user_id,
            from,
            to,
            projects: Vec::new(),
            languages: Vec::new(),
            editors: Vec::new(),
            operating_systems: Vec::new(),
            machines: Vec::new(),
            labels: Vec::new(),
            entities: Vec::new(),
            total_ms: 0,
        }
    }

    pub fn items(&self, kind: SummaryKind) -> &[SummaryItem] {
        match kind {
            SummaryKind::Project => &self.projects,
            SummaryKind::Language => &self.languages,
            SummaryKind::Editor => &self.editors,
            SummaryKind::OperatingSystem => &self.operating_systems,
            SummaryKind::Machine => &self.machines,
            SummaryKind::Label => &self.labels,
            SummaryKind::Entity => &self.entities,
        }
    }

    pub fn items_mut(&mut self, kind: SummaryKind) -> &mut Vec<SummaryItem> {
        match kind {
            SummaryKind::Project => &mut self.projects,
            SummaryKind::Language => &mut self.languages,
            SummaryKind::Editor => &mut self.editors,
            SummaryKind::OperatingSystem => &mut self.operating_systems,
            SummaryKind::Machine => &mut self.machines,
            SummaryKind::Label => &mut self.labels,
            SummaryKind::Entity => &mut self.entities,
        }
    }

    /// Duration recorded for `key` in `kind`, zero if absent.
    pub fn duration_of(&self, kind: SummaryKind, key: &str) -> i64 {
        self.items(kind)
            .iter()
            .find(|item| item.key == key)
            .map_or(0, |item| item.duration_ms)
    }

    /// Total excluding time whose language is unknown.
    pub fn total_excluding_unknown_language(&self) -> i64 {
        self.total_ms - self.duration_of(SummaryKind::Language, UNKNOWN_LABEL)
    }

    pub fn is_empty(&self) -> bool {
        self.total_ms == 0
    }

    /// Merges fragments into one summary spanning `[from, to)`.
    ///
    /// Durations are summed per key across fragments, then re-sorted.
    pub fn merge<'a>(
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        parts: impl IntoIterator<Item = &'a Self>,
    ) -> Self {
        let mut totals: HashMap<SummaryKind, HashMap<&'a str, i64>> = HashMap::new();
        let mut total_ms = 0;

        for part in parts {
            total_ms += part.total_ms;
            for kind in SummaryKind::ALL {
                let acc = totals.entry(kind).or_default();
                for item in part.items(kind) {
                    *acc.entry(item.key.as_str()).or_insert(0) += item.duration_ms;
                }
            }
        }

        let mut merged = Self::empty(user_id, from, to);
        merged.total_ms = total_ms;
        for (kind, acc) in totals {
            *merged.items_mut(kind) = into_sorted_items(
                acc.into_iter().map(|(key, ms)| (key.to_string(), ms)),
            );
        }
        merged
    }
}

/// Converts accumulated `(key, duration)` pairs into a sorted item list.
///
/// Zero-duration entries are dropped.
pub fn into_sorted_items(totals: impl IntoIterator<Item = (String, i64)>) -> Vec<SummaryItem> {
    let mut items: Vec<SummaryItem> = totals
        .into_iter()
        .filter(|(_, ms)| *ms > 0)
        .map(|(key, duration_ms)| SummaryItem { key, duration_ms })
        .collect();
    items.sort_by(|a, b| {
        b.duration_ms
            .cmp(&a.duration_ms)
            .then_with(|| a.key.cmp(&b.key))
    });
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user() -> UserId {
        UserId::new("alice").unwrap()
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap()
    }

    fn fragment(d: u32, projects: &[(&str, i64)]) -> Summary {
        let mut s = Summary::empty(user(), day(d), day(d + 1));
        s.projects = projects
            .iter()
            .map(|(k, ms)| SummaryItem::new(*k, *ms))
            .collect();
        s.total_ms = projects.iter().map(|(_, ms)| ms).sum();
        s
    }

    #[test]
    fn merge_sums_per_key_and_resorts() {
        let a = fragment(1, &[("alpha", 100), ("beta", 50)]);
        let b = fragment(2, &[("beta", 200)]);
        let merged = Summary::merge(user(), day(1), day(3), [&a, &b]);

        assert_eq!(merged.total_ms, 350);
        assert_eq!(
            merged.projects,
            vec![SummaryItem::new("beta", 250), SummaryItem::new("alpha", 100)]
        );
        assert!(merged.languages.is_empty());
        assert_eq!(merged.from, day(1));
        assert_eq!(merged.to, day(3));
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        let merged = Summary::merge(user(), day(1), day(2), []);
        assert!(merged.is_empty());
        assert!(merged.projects.is_empty());
    }

    #[test]
    fn sorted_items_break_ties_by_key_and_drop_zero() {
        let items = into_sorted_items([
            ("b".to_string(), 10),
            ("a".to_string(), 10),
            ("z".to_string(), 0),
            ("c".to_string(), 30),
        ]);
        let keys: Vec<_> = items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["c", "a", "b"]);
    }

    #[test]
    fn total_excluding_unknown_language() {
        let mut s = fragment(1, &[("p", 300)]);
        s.languages = vec![SummaryItem::new("Rust", 200), SummaryItem::new("unknown", 100)];
        assert_eq!(s.total_excluding_unknown_language(), 200);
    }

    #[test]
    fn summary_json_roundtrip_keeps_shape() {
        let s = fragment(1, &[("p", 60_000)]);
        let json = serde_json::to_string(&s).unwrap();
        let parsed: Summary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, s);
    }
}
