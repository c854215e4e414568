//! Project label commands.

use std::io::Write;

use anyhow::{Context, Result};
use hb_core::ProjectLabel;
use hb_service::SummaryService;

use crate::commands::util::parse_user;

pub async fn set<W: Write>(
    writer: &mut W,
    service: &SummaryService,
    user: &str,
    project: &str,
    label: &str,
) -> Result<()> {
    if label.trim().is_empty() {
        anyhow::bail!("label must not be empty");
    }
    let project_label = ProjectLabel {
        user_id: parse_user(user)?,
        project: project.to_string(),
        label: label.to_string(),
    };
    service
        .put_project_label(project_label)
        .await
        .context("failed to save label")?;
    writeln!(writer, "Labelled project {project:?} as {label:?}")?;
    Ok(())
}

pub async fn remove<W: Write>(
    writer: &mut W,
    service: &SummaryService,
    user: &str,
    project: &str,
) -> Result<()> {
    let removed = service
        .delete_project_label(&parse_user(user)?, project)
        .await
        .context("failed to remove label")?;
    if removed {
        writeln!(writer, "Removed label from project {project:?}")?;
    } else {
        writeln!(writer, "Project {project:?} has no label")?;
    }
    Ok(())
}

pub async fn list<W: Write>(writer: &mut W, service: &SummaryService, user: &str, json: bool) -> Result<()> {
    let labels = service
        .project_labels(&parse_user(user)?)
        .await
        .context("failed to list labels")?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&labels)?)?;
        return Ok(());
    }
    if labels.is_empty() {
        writeln!(writer, "No project labels.")?;
    }
    for label in &labels {
        writeln!(writer, "{}  {}", label.project, label.label)?;
    }
    Ok(())
}
