//! Stats command: per-category totals for a range.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use hb_core::Filters;
use hb_service::{StatsError, StatsItem, StatsQuery, StatsViewModel, SummaryService};

use crate::cli::StatsArgs;
use crate::commands::util::{format_local, parse_user, timezone_offset};

/// Items shown per category in the human-readable report.
const MAX_ITEMS: usize = 10;

pub async fn run<W: Write>(writer: &mut W, service: &SummaryService, args: &StatsArgs) -> Result<()> {
    let owner = parse_user(&args.user)?;
    let principal = if args.anonymous {
        None
    } else if let Some(viewer) = &args.viewer {
        Some(parse_user(viewer)?)
    } else {
        Some(owner)
    };

    let query = StatsQuery {
        user: args.user.clone(),
        principal,
        range: args.range.clone(),
        filters: filters(args),
        recompute: args.recompute,
    };
    let stats = service.get_stats(&query).await.map_err(|err| match err {
        StatsError::NotFound => anyhow::anyhow!("user {} not found", args.user),
        other => anyhow::Error::new(other),
    })?;

    if args.json {
        let json = serde_json::to_string_pretty(&stats).context("failed to encode stats")?;
        writeln!(writer, "{json}")?;
    } else {
        write!(writer, "{}", format_stats(&stats))?;
    }
    Ok(())
}

fn filters(args: &StatsArgs) -> Filters {
    Filters {
        project: args.project.clone(),
        language: args.language.clone(),
        editor: args.editor.clone(),
        operating_system: args.operating_system.clone(),
        machine: args.machine.clone(),
        label: args.label.clone(),
    }
}

/// Formats the human-readable stats report.
pub fn format_stats(stats: &StatsViewModel) -> String {
    let data = &stats.data;
    let tz = timezone_offset(&data.timezone);
    let mut output = String::new();

    writeln!(output, "STATS: {} ({})", data.user_id, data.range).unwrap();
    writeln!(
        output,
        "{} to {} ({})",
        format_local(data.start, tz),
        format_local(data.end, tz),
        data.timezone
    )
    .unwrap();

    let filters: Vec<String> = data
        .filters
        .active()
        .map(|(kind, value)| format!("{kind}={value}"))
        .collect();
    if !filters.is_empty() {
        writeln!(output, "Filters: {}", filters.join(", ")).unwrap();
    }

    writeln!(output).unwrap();
    writeln!(
        output,
        "Total:          {}",
        data.human_readable_total_including_other_language
    )
    .unwrap();
    writeln!(output, "Known language: {}", data.human_readable_total).unwrap();
    writeln!(
        output,
        "Daily average:  {}",
        data.human_readable_daily_average_including_other_language
    )
    .unwrap();

    let sections: [(&str, &[StatsItem]); 7] = [
        ("PROJECTS", &data.projects),
        ("LANGUAGES", &data.languages),
        ("EDITORS", &data.editors),
        ("OPERATING SYSTEMS", &data.operating_systems),
        ("MACHINES", &data.machines),
        ("LABELS", &data.labels),
        ("ENTITIES", &data.entities),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        writeln!(output).unwrap();
        writeln!(output, "{title}").unwrap();
        writeln!(output, "{}", "─".repeat(title.chars().count())).unwrap();
        for item in items.iter().take(MAX_ITEMS) {
            writeln!(
                output,
                "{:<32} {:>14} {:>7.2}%",
                truncate(&item.name, 32),
                item.text,
                item.percent
            )
            .unwrap();
        }
        if items.len() > MAX_ITEMS {
            writeln!(output, "... and {} more", items.len() - MAX_ITEMS).unwrap();
        }
    }

    output
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        return name.to_string();
    }
    let mut short: String = name.chars().take(width - 1).collect();
    short.push('…');
    short
}
