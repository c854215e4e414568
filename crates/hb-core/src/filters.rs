//! Query filters and their cache fingerprint.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::builder::ActivityContext;
use crate::heartbeat::{SummaryKind, push_field};

/// Fingerprint of the empty filter set.
pub const UNFILTERED: &str = "unfiltered";

/// Optional equality predicates on canonical (post-alias) values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Filters {
    const KINDS: [SummaryKind; 6] = [
        SummaryKind::Project,
        SummaryKind::Language,
        SummaryKind::Editor,
        SummaryKind::OperatingSystem,
        SummaryKind::Machine,
        SummaryKind::Label,
    ];

    pub fn get(&self, kind: SummaryKind) -> Option<&str> {
        let value = match kind {
            SummaryKind::Project => &self.project,
            SummaryKind::Language => &self.language,
            SummaryKind::Editor => &self.editor,
            SummaryKind::OperatingSystem => &self.operating_system,
            SummaryKind::Machine => &self.machine,
            SummaryKind::Label => &self.label,
            SummaryKind::Entity => return None,
        };
        value.as_deref()
    }

    /// Sets the filter for `kind`. Entity filters are not supported and ignored.
    #[must_use]
    pub fn with(mut self, kind: SummaryKind, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match kind {
            SummaryKind::Project => self.project = value,
            SummaryKind::Language => self.language = value,
            SummaryKind::Editor => self.editor = value,
            SummaryKind::OperatingSystem => self.operating_system = value,
            SummaryKind::Machine => self.machine = value,
            SummaryKind::Label => self.label = value,
            SummaryKind::Entity => {}
        }
        self
    }

    /// The filters that are set to a non-blank value, in a fixed order.
    pub fn active(&self) -> impl Iterator<Item = (SummaryKind, &str)> {
        Self::KINDS.into_iter().filter_map(|kind| {
            self.get(kind)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (kind, value))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }

    /// Whether a heartbeat with this canonical context passes every filter.
    pub fn matches(&self, context: &ActivityContext) -> bool {
        self.active()
            .all(|(kind, expected)| context.value(kind) == Some(expected))
    }

    /// Stable cache key for this filter combination.
    pub fn fingerprint(&self) -> String {
        if self.is_empty() {
            return UNFILTERED.to_string();
        }
        let mut canonical = String::from("filters;");
        for (kind, value) in self.active() {
            push_field(&mut canonical, kind.as_str());
            push_field(&mut canonical, value);
        }
        Uuid::new_v5(&Uuid::NAMESPACE_OID, canonical.as_bytes()).to_string()
    }
}
