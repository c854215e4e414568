//! Prune command for retention cleanup.

use std::io::Write;

use anyhow::{Context, Result};
use hb_service::SummaryService;

use crate::commands::util::parse_datetime;

/// Deletes heartbeats before `before`. Cached summaries stay in place.
pub async fn run<W: Write>(writer: &mut W, service: &SummaryService, before: &str) -> Result<usize> {
    let cutoff = parse_datetime(before)?;
    let deleted = service
        .prune(cutoff)
        .await
        .context("failed to prune heartbeats")?;
    writeln!(
        writer,
        "Deleted {deleted} heartbeat{} before {}",
        if deleted == 1 { "" } else { "s" },
        cutoff.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    )?;
    Ok(deleted)
}
