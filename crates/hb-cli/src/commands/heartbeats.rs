//! Heartbeats command: one local day of raw heartbeats.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hb_service::{HeartbeatsError, HeartbeatsResult, SummaryService};

use crate::commands::util::{parse_user, timezone_offset};

pub async fn run<W: Write>(
    writer: &mut W,
    service: &SummaryService,
    user: &str,
    date: &str,
    json: bool,
) -> Result<()> {
    let owner = parse_user(user)?;
    let result = service
        .get_heartbeats(user, Some(&owner), date)
        .await
        .map_err(|err| match err {
            HeartbeatsError::NotFound => anyhow::anyhow!("user {user} not found"),
            other => anyhow::Error::new(other),
        })?;

    if json {
        let json = serde_json::to_string_pretty(&result).context("failed to encode heartbeats")?;
        writeln!(writer, "{json}")?;
    } else {
        write!(writer, "{}", format_heartbeats(&result))?;
    }
    Ok(())
}

/// One line per heartbeat, in the owner's local time.
pub fn format_heartbeats(result: &HeartbeatsResult) -> String {
    let tz = timezone_offset(&result.timezone);
    let mut output = format!(
        "Heartbeats from {} to {} ({})\n",
        result.start, result.end, result.timezone
    );
    if result.data.is_empty() {
        output.push_str("No heartbeats recorded.\n");
        return output;
    }
    for entry in &result.data {
        #[allow(clippy::cast_possible_truncation)]
        let time = DateTime::<Utc>::from_timestamp_millis((entry.time * 1000.0).round() as i64)
            .map_or_else(|| "??:??:??".to_string(), |ts| {
                ts.with_timezone(&tz).format("%H:%M:%S").to_string()
            });
        let write = if entry.is_write { " (write)" } else { "" };
        output.push_str(&format!(
            "{time}  {}  {}  {}{write}\n",
            entry.project, entry.language, entry.entity
        ));
    }
    output
}
