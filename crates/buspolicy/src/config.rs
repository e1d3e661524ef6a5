use buspolicy_compiler::FragmentSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Where user and group names are resolved.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// The host's user and group databases.
    #[default]
    System,
    /// Only the `users` and `groups` tables of this file.
    Static,
}

/// Identity resolution settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityConfig {
    #[serde(default)]
    pub resolver: ResolverKind,

    /// Name to uid table, used when `resolver = "static"`.
    #[serde(default)]
    pub users: BTreeMap<String, u32>,

    /// Name to gid table, used when `resolver = "static"`.
    #[serde(default)]
    pub groups: BTreeMap<String, u32>,
}

/// How load results map to the exit status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportConfig {
    /// Exit non-zero when any fragment failed to load.
    #[serde(default)]
    pub fail_on_error: bool,
}

/// Top-level configuration for the buspolicy binary.
///
/// Loaded from a TOML file (typically `/etc/buspolicy/buspolicy.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Fragment files and drop-in directories, in load order.
    #[serde(default)]
    pub fragments: FragmentSet,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(AppError::Io)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(AppError::Io)?;
        }
        std::fs::write(path, contents).map_err(AppError::Io)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> AppResult<()> {
        if self.fragments.suffix.is_empty() {
            return Err(AppError::Config(
                "fragments.suffix must not be empty".into(),
            ));
        }
        if self.fragments.is_empty() {
            return Err(AppError::Config(
                "fragments must name at least one primary file or drop-in directory".into(),
            ));
        }
        Ok(())
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("/etc/buspolicy/buspolicy.toml")
    }
}
