//! Users and their sharing preferences.

use serde::{Deserialize, Serialize};

use crate::heartbeat::SummaryKind;
use crate::types::{UserId, UserTimezone};

/// An account owning heartbeats.
///
/// Share flags control what non-owners see. `share_data_max_days` limits how
/// far back non-owners may look; a negative value means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub timezone: UserTimezone,
    #[serde(default)]
    pub share_editors: bool,
    #[serde(default)]
    pub share_languages: bool,
    #[serde(default)]
    pub share_projects: bool,
    #[serde(default)]
    pub share_operating_systems: bool,
    #[serde(default)]
    pub share_machines: bool,
    #[serde(default)]
    pub share_labels: bool,
    #[serde(default)]
    pub share_data_max_days: i64,
}

impl User {
    /// A private user: nothing shared.
    pub fn new(id: UserId, timezone: UserTimezone) -> Self {
        Self {
            id,
            timezone,
            share_editors: false,
            share_languages: false,
            share_projects: false,
            share_operating_systems: false,
            share_machines: false,
            share_labels: false,
            share_data_max_days: 0,
        }
    }

    /// Whether non-owners may see the `kind` category.
    pub const fn shares(&self, kind: SummaryKind) -> bool {
        match kind {
            SummaryKind::Project => self.share_projects,
            SummaryKind::Language => self.share_languages,
            SummaryKind::Editor => self.share_editors,
            SummaryKind::OperatingSystem => self.share_operating_systems,
            SummaryKind::Machine => self.share_machines,
            SummaryKind::Label => self.share_labels,
            SummaryKind::Entity => false,
        }
    }

    /// Enables or disables sharing of one category. Entities cannot be shared.
    pub fn set_share(&mut self, kind: SummaryKind, value: bool) {
        match kind {
            SummaryKind::Project => self.share_projects = value,
            SummaryKind::Language => self.share_languages = value,
            SummaryKind::Editor => self.share_editors = value,
            SummaryKind::OperatingSystem => self.share_operating_systems = value,
            SummaryKind::Machine => self.share_machines = value,
            SummaryKind::Label => self.share_labels = value,
            SummaryKind::Entity => {}
        }
    }
}
