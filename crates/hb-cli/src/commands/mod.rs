//! CLI subcommand implementations.

pub mod alias;
pub mod heartbeats;
pub mod import;
pub mod label;
pub mod prune;
pub mod stats;
pub mod status;
pub mod user;
pub mod util;
