//! Status command for showing what the database holds per user.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::SecondsFormat;
use hb_core::UserId;
use hb_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let users = db.users()?;
    let total = db.count_heartbeats(None)?;

    writeln!(writer, "Heartbeat summary status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(writer, "Heartbeats: {total}")?;

    if users.is_empty() {
        writeln!(writer, "No users.")?;
        return Ok(());
    }

    let ids: Vec<UserId> = users.iter().map(|user| user.id.clone()).collect();
    let counts: HashMap<UserId, u64> = db
        .count_heartbeats_by_users(&ids)?
        .into_iter()
        .map(|row| (row.user_id, row.count))
        .collect();
    let firsts: HashMap<UserId, _> = db
        .first_heartbeat_times(&ids)?
        .into_iter()
        .map(|row| (row.user_id, row.time))
        .collect();

    writeln!(writer, "Users:")?;
    for user in &users {
        let count = counts.get(&user.id).copied().unwrap_or_default();
        write!(writer, "- {} ({}): {count} heartbeats", user.id, user.timezone)?;
        if let Some(first) = firsts.get(&user.id) {
            write!(
                writer,
                ", first {}",
                first.to_rfc3339_opts(SecondsFormat::Secs, true)
            )?;
        }
        if let Some(latest) = db.latest_heartbeat(&user.id, None)? {
            write!(
                writer,
                ", latest {}",
                latest.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
            )?;
        }
        writeln!(writer)?;
    }

    Ok(())
}
