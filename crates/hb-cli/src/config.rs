//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hb_core::{RangeSpec, SummaryConfig};
use hb_service::ServiceConfig;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Longest gap between heartbeats still counted as activity, in seconds.
    pub idle_timeout_secs: u64,

    /// Range used by `hb stats` when none is given.
    pub default_range: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("hb.db"),
            idle_timeout_secs: 600,
            default_range: "last_7_days".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // HB_DATABASE_PATH, HB_IDLE_TIMEOUT_SECS, HB_DEFAULT_RANGE
        figment = figment.merge(Env::prefixed("HB_"));

        figment.extract()
    }

    /// Service settings derived from this configuration.
    pub fn service_config(&self) -> anyhow::Result<ServiceConfig> {
        let default_range: RangeSpec = self
            .default_range
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid default_range in config: {err}"))?;
        let idle_timeout_ms = i64::try_from(self.idle_timeout_secs.saturating_mul(1000))
            .map_err(|_| anyhow::anyhow!("idle_timeout_secs is too large"))?;
        Ok(ServiceConfig {
            summary: SummaryConfig { idle_timeout_ms },
            default_range,
        })
    }
}

/// Returns the platform-specific config directory for hb.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hb"))
}

/// Returns the platform-specific data directory for hb.
///
/// On Linux: `~/.local/share/hb`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("hb"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use hb_core::NamedRange;

    #[test]
    fn test_dirs_data_path_ends_with_hb() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "hb");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("hb.db"));
        assert_eq!(config.idle_timeout_secs, 600);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "database_path = \"/tmp/custom.db\"\nidle_timeout_secs = 120\ndefault_range = \"today\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/custom.db"));
        let service = config.service_config().unwrap();
        assert_eq!(service.summary.idle_timeout_ms, 120_000);
        assert_eq!(service.default_range, RangeSpec::Named(NamedRange::Today));
    }

    #[test]
    fn test_invalid_default_range_is_rejected() {
        let config = Config {
            default_range: "fortnight".to_string(),
            ..Config::default()
        };
        let err = config.service_config().unwrap_err();
        assert!(err.to_string().contains("invalid default_range"));
    }
}
