//! Alias management commands.

use std::io::Write;

use anyhow::{Context, Result};
use hb_core::{Alias, SummaryKind};
use hb_service::SummaryService;

use crate::commands::util::{parse_kind, parse_user};

pub async fn add<W: Write>(
    writer: &mut W,
    service: &SummaryService,
    user: &str,
    kind: &str,
    raw: &str,
    canonical: &str,
) -> Result<()> {
    let kind = aliasable_kind(kind)?;
    let alias = Alias {
        user_id: parse_user(user)?,
        kind,
        raw: raw.to_string(),
        canonical: canonical.to_string(),
    };
    service
        .put_alias(alias)
        .await
        .context("failed to save alias")?;
    writeln!(writer, "{kind} {raw:?} now counts as {canonical:?}")?;
    Ok(())
}

pub async fn remove<W: Write>(
    writer: &mut W,
    service: &SummaryService,
    user: &str,
    kind: &str,
    raw: &str,
) -> Result<()> {
    let kind = aliasable_kind(kind)?;
    let removed = service
        .delete_alias(&parse_user(user)?, kind, raw)
        .await
        .context("failed to remove alias")?;
    if removed {
        writeln!(writer, "Removed {kind} alias {raw:?}")?;
    } else {
        writeln!(writer, "No {kind} alias {raw:?}")?;
    }
    Ok(())
}

pub async fn list<W: Write>(writer: &mut W, service: &SummaryService, user: &str, json: bool) -> Result<()> {
    let aliases = service
        .aliases(&parse_user(user)?)
        .await
        .context("failed to list aliases")?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&aliases)?)?;
        return Ok(());
    }
    if aliases.is_empty() {
        writeln!(writer, "No aliases.")?;
    }
    for alias in &aliases {
        writeln!(writer, "{}  {} -> {}", alias.kind, alias.raw, alias.canonical)?;
    }
    Ok(())
}

/// Labels are attached to projects, not renamed, and entities are never aliased.
fn aliasable_kind(s: &str) -> Result<SummaryKind> {
    let kind = parse_kind(s)?;
    if matches!(kind, SummaryKind::Label | SummaryKind::Entity) {
        anyhow::bail!("{kind} names cannot be aliased");
    }
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_metadata_categories_can_be_aliased() {
        assert_eq!(aliasable_kind("project").unwrap(), SummaryKind::Project);
        assert_eq!(aliasable_kind("os").unwrap(), SummaryKind::OperatingSystem);
        assert!(aliasable_kind("label").is_err());
        assert!(aliasable_kind("entity").is_err());
    }
}
