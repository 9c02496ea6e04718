use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{account_config::AccountConfig, scripting_config::ScriptingConfig};

/// User name reported to scripts when nothing else is configured
pub const DEFAULT_USERNAME: &str = "player";

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found")]
    NotFound,
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("IO error reading config: {0}")]
    IoError(String),
    #[error("No account named {0:?} in the config file")]
    UnknownAccount(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MineflayerConfig {
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,

    /// Scripting configuration
    #[serde(default)]
    pub scripting: ScriptingConfig,
}

impl MineflayerConfig {
    pub fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "mineflayer")
    }

    /// `<config dir>/mineflayer/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Directory the optional log file goes into
    pub fn log_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().join("logs"))
    }

    pub fn load() -> Result<Self, ConfigLoadError> {
        let path = Self::config_path().ok_or(ConfigLoadError::NotFound)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config =
            toml::from_str(&content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Pick the user name scripts see
    ///
    /// An explicit name wins, then the named account, then
    /// [`DEFAULT_USERNAME`].
    pub fn resolve_username(
        &self,
        username: Option<&str>,
        account: Option<&str>,
    ) -> Result<String, ConfigLoadError> {
        if let Some(username) = username {
            return Ok(username.to_string());
        }
        match account {
            Some(name) => self
                .accounts
                .get(name)
                .map(|account| account.username.clone())
                .ok_or_else(|| ConfigLoadError::UnknownAccount(name.to_string())),
            None => Ok(DEFAULT_USERNAME.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[accounts.main]
username = "alice"
password = "hunter2"

[accounts.alt]
username = "bob"

[scripting]
physics_fps = 20
"#;

    #[test]
    fn test_load_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, SAMPLE).unwrap();

        let config = MineflayerConfig::load_from(&path).unwrap();
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts["main"].password.as_deref(), Some("hunter2"));
        assert_eq!(config.accounts["alt"].password, None);
        assert_eq!(config.scripting.physics_fps, 20);
        assert!(!config.scripting.log_to_file);
    }

    #[test]
    fn test_missing_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MineflayerConfig::load_from(&dir.path().join("nope.toml")),
            Err(ConfigLoadError::NotFound)
        ));

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[scripting\nphysics_fps = ").unwrap();
        assert!(matches!(
            MineflayerConfig::load_from(&broken),
            Err(ConfigLoadError::ParseError(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config: MineflayerConfig = toml::from_str("").unwrap();
        assert_eq!(config, MineflayerConfig::default());
        assert_eq!(config.scripting.physics_fps, 10);
    }

    #[test]
    fn test_username_precedence() {
        let config: MineflayerConfig = toml::from_str(SAMPLE).unwrap();

        assert_eq!(
            config.resolve_username(Some("carol"), Some("main")).unwrap(),
            "carol"
        );
        assert_eq!(config.resolve_username(None, Some("main")).unwrap(), "alice");
        assert_eq!(config.resolve_username(None, None).unwrap(), DEFAULT_USERNAME);
        assert!(matches!(
            config.resolve_username(None, Some("ghost")),
            Err(ConfigLoadError::UnknownAccount(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_paths_contain_app_name() {
        if let Some(path) = MineflayerConfig::config_path() {
            assert!(path.to_string_lossy().contains("mineflayer"));
            assert!(path.ends_with("config.toml"));
        }
        if let Some(dir) = MineflayerConfig::log_dir() {
            assert!(dir.ends_with("logs"));
        }
    }
}
