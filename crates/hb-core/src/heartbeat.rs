//! Heartbeats: the raw activity signals everything else is derived from.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{UserId, ValidationError};

/// Label used when a heartbeat leaves a metadata field empty.
pub const UNKNOWN_LABEL: &str = "unknown";

/// What kind of thing a heartbeat's `entity` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityType {
    #[default]
    File,
    Domain,
    App,
}

impl EntityType {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Domain => "domain",
            Self::App => "app",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "domain" | "url" => Ok(Self::Domain),
            "app" => Ok(Self::App),
            _ => Err(ValidationError::UnknownEntityType {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for EntityType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The summary categories a heartbeat's duration is attributed to.
///
/// Also used as the alias type and as the `entity_type` argument of
/// entity-set queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SummaryKind {
    Project,
    Language,
    Editor,
    OperatingSystem,
    Machine,
    Label,
    Entity,
}

impl SummaryKind {
    /// Every kind, in display order.
    pub const ALL: [Self; 7] = [
        Self::Project,
        Self::Language,
        Self::Editor,
        Self::OperatingSystem,
        Self::Machine,
        Self::Label,
        Self::Entity,
    ];

    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Language => "language",
            Self::Editor => "editor",
            Self::OperatingSystem => "operating_system",
            Self::Machine => "machine",
            Self::Label => "label",
            Self::Entity => "entity",
        }
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SummaryKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "language" => Ok(Self::Language),
            "editor" => Ok(Self::Editor),
            "operating_system" | "os" => Ok(Self::OperatingSystem),
            "machine" => Ok(Self::Machine),
            "label" => Ok(Self::Label),
            "entity" => Ok(Self::Entity),
            _ => Err(ValidationError::UnknownSummaryKind {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for SummaryKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SummaryKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Appends `value` length-prefixed, so adjacent fields cannot run together.
pub(crate) fn push_field(buf: &mut String, value: &str) {
    let _ = write!(buf, "{}:{value};", value.len());
}

/// A single timestamped activity event.
///
/// Heartbeats are immutable once stored. Two heartbeats with identical
/// content share an [`id`](Heartbeat::id), which is how replays are deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub editor: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub machine: String,
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub entity_type: EntityType,
    #[serde(default)]
    pub is_write: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Heartbeat {
    /// Deterministic content hash used as the heartbeat's identity.
    pub fn id(&self) -> String {
        let timestamp = self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut content = String::from("heartbeat;");
        for field in [
            self.user_id.as_str(),
            timestamp.as_str(),
            self.project.as_str(),
            self.language.as_str(),
            self.editor.as_str(),
            self.operating_system.as_str(),
            self.machine.as_str(),
            self.entity.as_str(),
            self.entity_type.as_str(),
            if self.is_write { "write" } else { "read" },
        ] {
            push_field(&mut content, field);
        }
        match &self.origin {
            Some(origin) => push_field(&mut content, origin),
            None => content.push('~'),
        }
        Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()).to_string()
    }

    /// Raw value of the field backing `kind`.
    ///
    /// Labels are not stored on heartbeats, so `Label` yields `None`.
    pub fn field(&self, kind: SummaryKind) -> Option<&str> {
        match kind {
            SummaryKind::Project => Some(&self.project),
            SummaryKind::Language => Some(&self.language),
            SummaryKind::Editor => Some(&self.editor),
            SummaryKind::OperatingSystem => Some(&self.operating_system),
            SummaryKind::Machine => Some(&self.machine),
            SummaryKind::Entity => Some(&self.entity),
            SummaryKind::Label => None,
        }
    }
}

/// Heartbeat count for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountByUser {
    pub user_id: UserId,
    pub count: u64,
}

/// A point in time associated with one user (e.g. first heartbeat).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeByUser {
    pub user_id: UserId,
    pub time: DateTime<Utc>,
}
