//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Heartbeat summaries.
///
/// Stores coding-activity heartbeats and reports how time was spent per
/// project, language, editor, operating system, machine and label.
#[derive(Debug, Parser)]
#[command(name = "hb", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show per-category totals for a range.
    Stats(StatsArgs),

    /// List a user's heartbeats for one local day.
    Heartbeats {
        /// User whose heartbeats to list.
        user: String,

        /// Local date (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Import heartbeats from JSON lines.
    Import {
        /// File to read; stdin when omitted.
        file: Option<PathBuf>,

        /// User to assign to lines without a `user_id`.
        #[arg(long)]
        user: Option<String>,
    },

    /// Delete heartbeats older than a cutoff.
    Prune {
        /// Cutoff (ISO 8601 or relative, e.g. '90 days ago').
        #[arg(long)]
        before: String,
    },

    /// Manage users.
    #[command(subcommand)]
    User(UserAction),

    /// Manage aliases that fold raw names into one.
    #[command(subcommand)]
    Alias(AliasAction),

    /// Manage project labels.
    #[command(subcommand)]
    Label(LabelAction),

    /// Show database status.
    Status,
}

/// Arguments for `hb stats`.
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// User to report on.
    pub user: String,

    /// Range token (today, yesterday, week, last_7_days, all_time,
    /// YYYY-MM-DD, YYYY-MM-DD..YYYY-MM-DD, ...).
    #[arg(long)]
    pub range: Option<String>,

    /// Only count this project.
    #[arg(long)]
    pub project: Option<String>,

    /// Only count this language.
    #[arg(long)]
    pub language: Option<String>,

    /// Only count this editor.
    #[arg(long)]
    pub editor: Option<String>,

    /// Only count this operating system.
    #[arg(long = "os")]
    pub operating_system: Option<String>,

    /// Only count this machine.
    #[arg(long)]
    pub machine: Option<String>,

    /// Only count projects with this label.
    #[arg(long)]
    pub label: Option<String>,

    /// View as another user instead of the owner.
    #[arg(long = "as", value_name = "USER", conflicts_with = "anonymous")]
    pub viewer: Option<String>,

    /// View as an anonymous visitor.
    #[arg(long)]
    pub anonymous: bool,

    /// Rebuild cached days instead of reusing them.
    #[arg(long)]
    pub recompute: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// User management.
#[derive(Debug, Subcommand)]
pub enum UserAction {
    /// Create or update a user.
    Add {
        /// User ID.
        id: String,

        /// Fixed UTC offset such as +09:00, or UTC.
        #[arg(long, default_value = "UTC")]
        timezone: String,

        /// Categories visible to others (project, language, editor, os,
        /// machine, label).
        #[arg(long, value_delimiter = ',')]
        share: Vec<String>,

        /// How many days back others may look; negative for unlimited.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        share_days: i64,
    },

    /// List users.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Alias management.
#[derive(Debug, Subcommand)]
pub enum AliasAction {
    /// Fold a raw name into a canonical one.
    Add {
        user: String,
        /// Category (project, language, editor, os, machine).
        kind: String,
        raw: String,
        canonical: String,
    },

    /// Remove an alias.
    Remove {
        user: String,
        kind: String,
        raw: String,
    },

    /// List a user's aliases.
    List {
        user: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Project label management.
#[derive(Debug, Subcommand)]
pub enum LabelAction {
    /// Attach a label to a project, replacing any previous one.
    Set {
        user: String,
        project: String,
        label: String,
    },

    /// Remove a project's label.
    Remove { user: String, project: String },

    /// List a user's project labels.
    List {
        user: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
