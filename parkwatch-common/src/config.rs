//! Configuration loading for Parkwatch
//!
//! Resolution priority per field: environment variable, then TOML config
//! file, then compiled default. The TOML file path itself may be supplied on
//! the command line; otherwise `parkwatch.toml` in the working directory is
//! used when present.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default gateway endpoint (PlateRecognizer-compatible plate reader)
const DEFAULT_GATEWAY_URL: &str = "https://api.platerecognizer.com/v1/plate-reader/";

/// TOML file contents; every field optional, defaults applied afterwards
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub database_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
    pub private_key_path: Option<PathBuf>,
    pub gateway_url: Option<String>,
    pub gateway_timeout_secs: Option<u64>,
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite ledger location
    pub database_path: PathBuf,
    /// Public key PEM, required for every ingestion run
    pub public_key_path: PathBuf,
    /// Expected private key location. Ingestion refuses to run while a file
    /// exists here; the reveal operation reads it from wherever the
    /// custodian mounted it.
    pub private_key_path: PathBuf,
    /// Recognition gateway endpoint
    pub gateway_url: String,
    /// Per-request gateway timeout
    pub gateway_timeout_secs: u64,
}

impl Config {
    /// Load configuration with ENV > TOML > default resolution
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let toml_config = match config_file {
            Some(path) => Some(read_toml(path)?),
            None => {
                let default = Path::new("parkwatch.toml");
                if default.exists() {
                    Some(read_toml(default)?)
                } else {
                    None
                }
            }
        };
        let toml_config = toml_config.unwrap_or_default();

        let config = Self {
            database_path: env_path("PARKWATCH_DATABASE")
                .or(toml_config.database_path)
                .unwrap_or_else(|| PathBuf::from("parkwatch.db")),
            public_key_path: env_path("PARKWATCH_PUBLIC_KEY")
                .or(toml_config.public_key_path)
                .unwrap_or_else(|| PathBuf::from("keys/public_key.pem")),
            private_key_path: env_path("PARKWATCH_PRIVATE_KEY")
                .or(toml_config.private_key_path)
                .unwrap_or_else(|| PathBuf::from("keys/private_key.pem")),
            gateway_url: std::env::var("PARKWATCH_GATEWAY_URL")
                .ok()
                .or(toml_config.gateway_url)
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            gateway_timeout_secs: std::env::var("PARKWATCH_GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(toml_config.gateway_timeout_secs)
                .unwrap_or(30),
        };

        info!(
            database = %config.database_path.display(),
            gateway = %config.gateway_url,
            "Configuration resolved"
        );

        Ok(config)
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name).ok().map(PathBuf::from)
}

fn read_toml(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for var in [
            "PARKWATCH_DATABASE",
            "PARKWATCH_PUBLIC_KEY",
            "PARKWATCH_PRIVATE_KEY",
            "PARKWATCH_GATEWAY_URL",
            "PARKWATCH_GATEWAY_TIMEOUT_SECS",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_without_file_or_env() {
        clear_env();
        let config = Config::load(None).unwrap();
        assert_eq!(config.database_path, PathBuf::from("parkwatch.db"));
        assert_eq!(config.public_key_path, PathBuf::from("keys/public_key.pem"));
        assert_eq!(config.gateway_timeout_secs, 30);
        assert!(config.gateway_url.contains("plate-reader"));
    }

    #[test]
    #[serial]
    fn toml_values_override_defaults() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "database_path = \"/data/lot.db\"\ngateway_timeout_secs = 5"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/data/lot.db"));
        assert_eq!(config.gateway_timeout_secs, 5);
        // Unset fields keep defaults
        assert_eq!(config.private_key_path, PathBuf::from("keys/private_key.pem"));
    }

    #[test]
    #[serial]
    fn env_overrides_toml() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = \"/data/lot.db\"").unwrap();

        std::env::set_var("PARKWATCH_DATABASE", "/env/lot.db");
        let config = Config::load(Some(file.path())).unwrap();
        std::env::remove_var("PARKWATCH_DATABASE");

        assert_eq!(config.database_path, PathBuf::from("/env/lot.db"));
    }

    #[test]
    #[serial]
    fn malformed_toml_is_a_config_error() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = [not toml").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
