//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("metrics.db"),
        }
    }
}

impl Config {
    /// Loads configuration from default locations, then `config_path`, then `CM_*` variables.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (CM_*)
        figment = figment.merge(Env::prefixed("CM_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for cm.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("cm"))
}

/// Returns the platform-specific data directory for cm.
///
/// On Linux: `~/.local/share/cm`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("cm"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_cm() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "cm");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("metrics.db"));
    }

    #[test]
    fn test_config_file_overrides_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"database_path = "/tmp/cm-test/metrics.db""#).unwrap();
        file.flush().unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load_from(Some(file.path()))?;
            assert_eq!(config.database_path, PathBuf::from("/tmp/cm-test/metrics.db"));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_config_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("custom.toml", r#"database_path = "from-file.db""#)?;
            jail.set_env("CM_DATABASE_PATH", "from-env.db");
            let config = Config::load_from(Some(Path::new("custom.toml")))?;
            assert_eq!(config.database_path, PathBuf::from("from-env.db"));
            Ok(())
        });
    }
}
