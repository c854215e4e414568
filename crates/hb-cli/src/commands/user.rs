//! User management commands.

use std::io::Write;

use anyhow::{Context, Result};
use hb_core::{SummaryKind, User, UserTimezone};
use hb_service::SummaryService;

use crate::commands::util::{parse_kind, parse_user};

/// Options for creating or updating a user.
#[derive(Debug, Clone)]
pub struct UserSpec<'a> {
    pub id: &'a str,
    pub timezone: &'a str,
    pub share: &'a [String],
    pub share_days: i64,
}

pub async fn add<W: Write>(writer: &mut W, service: &SummaryService, spec: &UserSpec<'_>) -> Result<()> {
    let user = build_user(spec)?;
    let shared = shared_kinds(&user);
    service
        .put_user(user.clone())
        .await
        .context("failed to save user")?;
    writeln!(
        writer,
        "Saved user {} ({}), sharing: {}",
        user.id,
        user.timezone,
        if shared.is_empty() {
            "nothing".to_string()
        } else {
            shared.join(", ")
        }
    )?;
    Ok(())
}

pub async fn list<W: Write>(writer: &mut W, service: &SummaryService, json: bool) -> Result<()> {
    let users = service.users().await.context("failed to list users")?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&users)?)?;
        return Ok(());
    }
    write!(writer, "{}", format_users(&users))?;
    Ok(())
}

fn build_user(spec: &UserSpec<'_>) -> Result<User> {
    let id = parse_user(spec.id)?;
    let timezone: UserTimezone = spec
        .timezone
        .parse()
        .with_context(|| format!("invalid timezone: {:?}", spec.timezone))?;
    let mut user = User::new(id, timezone);
    for kind in spec.share {
        let kind = parse_kind(kind)?;
        if kind == SummaryKind::Entity {
            anyhow::bail!("entities cannot be shared");
        }
        user.set_share(kind, true);
    }
    user.share_data_max_days = spec.share_days;
    Ok(user)
}

fn shared_kinds(user: &User) -> Vec<&'static str> {
    SummaryKind::ALL
        .into_iter()
        .filter(|kind| user.shares(*kind))
        .map(|kind| kind.as_str())
        .collect()
}

fn format_users(users: &[User]) -> String {
    if users.is_empty() {
        return "No users.\n".to_string();
    }
    let mut output = String::new();
    for user in users {
        let shared = shared_kinds(user);
        let window = match user.share_data_max_days {
            days if days < 0 => "unlimited".to_string(),
            1 => "1 day".to_string(),
            days => format!("{days} days"),
        };
        output.push_str(&format!(
            "{}  {}  shares: {}  window: {window}\n",
            user.id,
            user.timezone,
            if shared.is_empty() {
                "-".to_string()
            } else {
                shared.join(",")
            }
        ));
    }
    output
}
