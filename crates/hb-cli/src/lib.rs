//! Heartbeat summary CLI library.
//!
//! This crate provides the `hb` command-line interface over the summary service.

mod cli;
pub mod commands;
mod config;

pub use cli::{AliasAction, Cli, Commands, LabelAction, StatsArgs, UserAction};
pub use config::Config;
