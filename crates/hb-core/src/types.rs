//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The timezone string could not be parsed as a UTC offset.
    #[error("invalid timezone: {value}")]
    InvalidTimezone { value: String },

    /// Unknown entity type string.
    #[error("unknown entity type: {value}")]
    UnknownEntityType { value: String },

    /// Unknown summary category string.
    #[error("unknown summary kind: {value}")]
    UnknownSummaryKind { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

define_string_id!(
    /// A validated user identifier.
    ///
    /// User IDs must be non-empty. The literal `current` is resolved to the
    /// requesting principal at the service boundary, never stored.
    UserId, "user ID"
);

/// A user's timezone, stored as a fixed offset from UTC.
///
/// Accepts `UTC`, `Z`, `GMT`, `+09:00`, `-0530`, `+9` and `UTC+9` style input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserTimezone(FixedOffset);

impl UserTimezone {
    /// The UTC timezone.
    pub fn utc() -> Self {
        Self(Utc.fix())
    }

    /// Wraps a fixed offset.
    #[must_use]
    pub const fn new(offset: FixedOffset) -> Self {
        Self(offset)
    }

    /// Creates a timezone from an offset in seconds east of UTC.
    pub fn from_offset_secs(secs: i32) -> Result<Self, ValidationError> {
        FixedOffset::east_opt(secs)
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidTimezone {
                value: secs.to_string(),
            })
    }

    /// Returns the underlying offset.
    #[must_use]
    pub const fn offset(self) -> FixedOffset {
        self.0
    }

    /// Human-readable name (`UTC` or `+09:00`).
    pub fn name(self) -> String {
        self.to_string()
    }
}

impl Default for UserTimezone {
    fn default() -> Self {
        Self::utc()
    }
}

impl TryFrom<String> for UserTimezone {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserTimezone> for String {
    fn from(tz: UserTimezone) -> Self {
        tz.to_string()
    }
}

impl fmt::Display for UserTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.local_minus_utc() == 0 {
            write!(f, "UTC")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for UserTimezone {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTimezone {
            value: s.to_string(),
        };
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        if matches!(upper.as_str(), "UTC" | "Z" | "GMT") {
            return Ok(Self::utc());
        }
        let rest = upper
            .strip_prefix("UTC")
            .or_else(|| upper.strip_prefix("GMT"))
            .unwrap_or(&upper);

        let (sign, digits) = match rest.as_bytes().first() {
            Some(b'+') => (1, &rest[1..]),
            Some(b'-') => (-1, &rest[1..]),
            _ => return Err(invalid()),
        };

        let (hours, minutes) = if let Some((h, m)) = digits.split_once(':') {
            (h, m)
        } else if digits.len() == 4 {
            digits.split_at(2)
        } else {
            (digits, "0")
        };
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if hours > 14 || minutes >= 60 {
            return Err(invalid());
        }

        Self::from_offset_secs(sign * (hours * 3600 + minutes * 60)).map_err(|_| invalid())
    }
}
