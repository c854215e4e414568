//! Import command for loading heartbeats from JSON lines.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use hb_core::{Heartbeat, UserId};
use hb_service::SummaryService;

/// Outcome of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub read: usize,
    pub inserted: usize,
}

impl ImportSummary {
    pub const fn duplicates(&self) -> usize {
        self.read - self.inserted
    }
}

pub async fn run(
    service: &SummaryService,
    file: Option<&Path>,
    default_user: Option<&UserId>,
) -> Result<ImportSummary> {
    let heartbeats = match file {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            parse_heartbeats(BufReader::new(file), default_user)?
        }
        None => parse_heartbeats(io::stdin().lock(), default_user)?,
    };

    let read = heartbeats.len();
    let inserted = service
        .insert_heartbeats(heartbeats)
        .await
        .context("failed to store heartbeats")?;
    Ok(ImportSummary { read, inserted })
}

fn parse_heartbeats<R: BufRead>(
    reader: R,
    default_user: Option<&UserId>,
) -> Result<Vec<Heartbeat>> {
    let mut heartbeats = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut value: serde_json::Value = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON on line {}", idx + 1))?;
        if let (Some(user), Some(object)) = (default_user, value.as_object_mut()) {
            object
                .entry("user_id")
                .or_insert_with(|| serde_json::Value::String(user.to_string()));
        }
        let heartbeat: Heartbeat = serde_json::from_value(value)
            .with_context(|| format!("invalid heartbeat on line {}", idx + 1))?;
        heartbeats.push(heartbeat);
    }
    Ok(heartbeats)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use hb_core::EntityType;

    #[test]
    fn parse_heartbeats_applies_default_user() {
        let input = r#"{"timestamp":"2024-03-05T09:00:00Z","project":"hb","language":"Rust"}

{"user_id":"bob","timestamp":"2024-03-05T09:05:00Z","entity":"https://docs.rs","entity_type":"url"}"#;
        let alice = UserId::new("alice").unwrap();

        let heartbeats = parse_heartbeats(Cursor::new(input), Some(&alice)).unwrap();

        assert_eq!(heartbeats.len(), 2);
        assert_eq!(heartbeats[0].user_id, alice);
        assert_eq!(heartbeats[0].project, "hb");
        assert_eq!(heartbeats[1].user_id.as_str(), "bob");
        assert_eq!(heartbeats[1].entity_type, EntityType::Domain);
    }

    #[test]
    fn parse_heartbeats_requires_a_user() {
        let input = r#"{"timestamp":"2024-03-05T09:00:00Z"}"#;

        let err = parse_heartbeats(Cursor::new(input), None).unwrap_err();

        assert!(err.to_string().contains("invalid heartbeat on line 1"));
    }

    #[test]
    fn parse_heartbeats_reports_bad_json_line() {
        let input = "{\"timestamp\":\"2024-03-05T09:00:00Z\",\"user_id\":\"a\"}\nnot json";

        let err = parse_heartbeats(Cursor::new(input), None).unwrap_err();

        assert!(err.to_string().contains("invalid JSON on line 2"));
    }
}
