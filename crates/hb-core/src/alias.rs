//! Alias resolution and project labels.
//!
//! Aliases fold raw names (e.g. a renamed project) into one canonical name.
//! They are applied to every heartbeat before aggregation, so aliased names
//! always merge into a single summary item.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::heartbeat::SummaryKind;
use crate::types::UserId;

/// A user-defined rename rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub user_id: UserId,
    pub kind: SummaryKind,
    /// The raw name as it appears on heartbeats.
    pub raw: String,
    /// The name reported in summaries.
    pub canonical: String,
}

/// A label attached to a canonical project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectLabel {
    pub user_id: UserId,
    pub project: String,
    pub label: String,
}

/// Per-user alias lookup table.
#[derive(Debug, Clone, Default)]
pub struct AliasResolver {
    rules: HashMap<SummaryKind, HashMap<String, String>>,
}

impl AliasResolver {
    pub fn new<'a>(aliases: impl IntoIterator<Item = &'a Alias>) -> Self {
        let mut rules: HashMap<SummaryKind, HashMap<String, String>> = HashMap::new();
        for alias in aliases {
            rules
                .entry(alias.kind)
                .or_default()
                .insert(alias.raw.clone(), alias.canonical.clone());
        }
        Self { rules }
    }

    /// Canonical name for `raw`, or `raw` itself when no rule applies.
    pub fn canonicalize<'a>(&'a self, kind: SummaryKind, raw: &'a str) -> &'a str {
        self.rules
            .get(&kind)
            .and_then(|rules| rules.get(raw))
            .map_or(raw, String::as_str)
    }

    /// Raw names that fold into `canonical`, sorted.
    pub fn raw_names(&self, kind: SummaryKind, canonical: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .rules
            .get(&kind)
            .into_iter()
            .flatten()
            .filter(|(_, c)| c.as_str() == canonical)
            .map(|(raw, _)| raw.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-user project to label lookup.
#[derive(Debug, Clone, Default)]
pub struct ProjectLabels {
    labels: HashMap<String, String>,
}

impl ProjectLabels {
    pub fn new<'a>(labels: impl IntoIterator<Item = &'a ProjectLabel>) -> Self {
        let labels = labels
            .into_iter()
            .map(|l| (l.project.clone(), l.label.clone()))
            .collect();
        Self { labels }
    }

    pub fn label_for(&self, project: &str) -> Option<&str> {
        self.labels.get(project).map(String::as_str)
    }
}
