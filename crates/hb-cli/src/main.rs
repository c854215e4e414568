use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hb_cli::commands::{alias, heartbeats, import, label, prune, stats, status, user};
use hb_cli::{AliasAction, Cli, Commands, Config, LabelAction, UserAction};
use hb_db::Database;
use hb_service::SummaryService;

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(Arc<Database>, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = Database::open(&config.database_path).context("failed to open database")?;
    Ok((Arc::new(db), config))
}

/// Open the database and wire the summary service over it.
fn open_service(config_path: Option<&Path>) -> Result<SummaryService> {
    let (db, config) = open_database(config_path)?;
    let service_config = config.service_config()?;
    Ok(SummaryService::from_store(db, service_config))
}

#[tokio::main]
#[expect(
    clippy::too_many_lines,
    reason = "main dispatches every subcommand"
)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // stdout carries command output only.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config_path = cli.config.as_deref();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Some(Commands::Stats(args)) => {
            let service = open_service(config_path)?;
            stats::run(&mut out, &service, args).await?;
        }
        Some(Commands::Heartbeats { user, date, json }) => {
            let service = open_service(config_path)?;
            heartbeats::run(&mut out, &service, user, date, *json).await?;
        }
        Some(Commands::Import { file, user }) => {
            let service = open_service(config_path)?;
            let default_user = user
                .as_deref()
                .map(hb_cli::commands::util::parse_user)
                .transpose()?;
            let summary = import::run(&service, file.as_deref(), default_user.as_ref()).await?;
            writeln!(
                out,
                "Imported {} heartbeats ({} duplicates skipped)",
                summary.inserted,
                summary.duplicates()
            )?;
        }
        Some(Commands::Prune { before }) => {
            let service = open_service(config_path)?;
            prune::run(&mut out, &service, before).await?;
        }
        Some(Commands::User(action)) => {
            let service = open_service(config_path)?;
            match action {
                UserAction::Add {
                    id,
                    timezone,
                    share,
                    share_days,
                } => {
                    let spec = user::UserSpec {
                        id,
                        timezone,
                        share,
                        share_days: *share_days,
                    };
                    user::add(&mut out, &service, &spec).await?;
                }
                UserAction::List { json } => user::list(&mut out, &service, *json).await?,
            }
        }
        Some(Commands::Alias(action)) => {
            let service = open_service(config_path)?;
            match action {
                AliasAction::Add {
                    user,
                    kind,
                    raw,
                    canonical,
                } => alias::add(&mut out, &service, user, kind, raw, canonical).await?,
                AliasAction::Remove { user, kind, raw } => {
                    alias::remove(&mut out, &service, user, kind, raw).await?;
                }
                AliasAction::List { user, json } => {
                    alias::list(&mut out, &service, user, *json).await?;
                }
            }
        }
        Some(Commands::Label(action)) => {
            let service = open_service(config_path)?;
            match action {
                LabelAction::Set {
                    user,
                    project,
                    label: name,
                } => label::set(&mut out, &service, user, project, name).await?,
                LabelAction::Remove { user, project } => {
                    label::remove(&mut out, &service, user, project).await?;
                }
                LabelAction::List { user, json } => {
                    label::list(&mut out, &service, user, *json).await?;
                }
            }
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(config_path)?;
            status::run(&mut out, &db, &config.database_path)?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
