//! Typed settings for SpecsBiz, layered from defaults, TOML files and environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use specsbiz_core::TenantId;

/// Directory searched for `default.toml` when no explicit file is given.
pub const CONFIG_DIR: &str = "config";
/// Prefix for environment overrides, e.g. `SPECSBIZ__STORAGE__BACKEND=local`.
pub const ENV_PREFIX: &str = "SPECSBIZ";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecsBizConfig {
    pub tenant: TenantId,
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    pub log: LogConfig,
}

impl Default for SpecsBizConfig {
    fn default() -> Self {
        Self {
            tenant: TenantId::default(),
            storage: StorageConfig::default(),
            ledger: LedgerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Which backing store the ledger runs against.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Transactional SQLite database.
    Sqlite,
    /// Whole-document slots on the local filesystem.
    Local,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite file for `sqlite`, slot directory for `local`.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("data/specsbiz.db"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Recompute balances whenever a single customer is read and warn on drift.
    pub verify_on_read: bool,
    /// Balance drift at or below this value is not reported.
    pub reconcile_tolerance: Decimal,
    /// Capacity of the live-query broadcast channel.
    pub event_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            verify_on_read: false,
            reconcile_tolerance: Decimal::ZERO,
            event_capacity: 256,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl SpecsBizConfig {
    /// Load settings: defaults, then `config/default.toml`, then `explicit`, then env.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(Path::new(CONFIG_DIR), explicit)
    }

    pub fn load_from(config_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let defaults = toml::to_string(&SpecsBizConfig::default())
            .context("failed to render default configuration")?;
        let mut builder = Config::builder()
            .add_source(File::from_str(&defaults, FileFormat::Toml))
            .add_source(File::from(config_dir.join("default.toml")).required(false));
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("failed to assemble configuration sources")?;
        let config: SpecsBizConfig = settings
            .try_deserialize()
            .context("invalid SpecsBiz configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ledger.reconcile_tolerance < Decimal::ZERO {
            anyhow::bail!(
                "ledger.reconcile_tolerance must not be negative (got {})",
                self.ledger.reconcile_tolerance
            );
        }
        if self.storage.path.as_os_str().is_empty() {
            anyhow::bail!("storage.path must not be empty");
        }
        Ok(())
    }

    /// Render the effective configuration as pretty JSON for diagnostics.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_apply_without_files() {
        let dir = tempdir().unwrap();
        let config = SpecsBizConfig::load_from(dir.path(), None).unwrap();
        assert_eq!(config.tenant.as_str(), "default");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.ledger.event_capacity, 256);
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shop.toml");
        fs::write(
            &path,
            r#"
tenant = "corner-shop"

[storage]
backend = "local"
path = "slots"

[ledger]
verify_on_read = true
reconcile_tolerance = "0.01"
"#,
        )
        .unwrap();
        let config = SpecsBizConfig::load_from(dir.path(), Some(&path)).unwrap();
        assert_eq!(config.tenant.as_str(), "corner-shop");
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.storage.path, PathBuf::from("slots"));
        assert!(config.ledger.verify_on_read);
        assert_eq!(config.ledger.reconcile_tolerance, Decimal::new(1, 2));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(SpecsBizConfig::load_from(dir.path(), Some(&missing)).is_err());
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[ledger]\nreconcile_tolerance = \"-1\"\n").unwrap();
        assert!(SpecsBizConfig::load_from(dir.path(), Some(&path)).is_err());
    }
}
