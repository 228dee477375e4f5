//! Application configuration.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::FileSessionStore;

/// Directory under the user's config dir holding configuration and session state.
pub const CONFIG_DIR: &str = "cardadmin";
/// Base URL of the card API when nothing else is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001";
/// Location the session gate redirects to when no token is stored.
pub const DEFAULT_LOGIN_PATH: &str = "/login";
/// Location of the protected card management view.
pub const DEFAULT_CARDS_PATH: &str = "/cards";

const DEFAULT_CONFIG: &str = r#"# cardadmin configuration
#
# Every key can also be overridden with a CARDADMIN_<KEY> environment variable.

# Base URL of the card API server.
api_base_url = "http://localhost:3001"

# Session file holding {"adminToken": "..."}; defaults to session.json next to this file.
# session_file = "/path/to/session.json"

login_path = "/login"
cards_path = "/cards"
"#;

/// Runtime configuration for the console.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Base URL of the remote card API.
    pub api_base_url: String,
    /// JSON file holding the persisted session token.
    pub session_file: PathBuf,
    /// Destination used when the session gate redirects.
    pub login_path: String,
    /// Location of the protected card view.
    pub cards_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            session_file: config_root().join("session.json"),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            cards_path: DEFAULT_CARDS_PATH.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration layered over the file at `path`, which may be missing.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let defaults = AppConfig::default();
        let settings = Config::builder()
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default(
                "session_file",
                defaults.session_file.to_string_lossy().to_string(),
            )?
            .set_default("login_path", defaults.login_path)?
            .set_default("cards_path", defaults.cards_path)?
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("CARDADMIN"))
            .build()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("failed to parse configuration")?;
        config.api_base_url = config.api_base_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Session store backed by the configured session file.
    pub fn session_store(&self) -> FileSessionStore {
        FileSessionStore::new(self.session_file.clone())
    }
}

/// Directory holding configuration and session files.
pub fn config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

/// Default configuration file path.
pub fn config_path() -> PathBuf {
    config_root().join("config.toml")
}

/// Write the default configuration file if none exists yet.
pub fn ensure_default_config() -> Result<()> {
    write_default_config(config_path())
}

fn write_default_config(path: PathBuf) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(&path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = AppConfig::load_from(dir.path().join("absent.toml"))?;
        assert_eq!(config.login_path, DEFAULT_LOGIN_PATH);
        assert_eq!(config.cards_path, DEFAULT_CARDS_PATH);
        assert!(config.session_file.ends_with("session.json"));
        Ok(())
    }

    #[test]
    fn file_values_override_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        let session = dir.path().join("token.json");
        fs::write(
            &path,
            format!(
                "api_base_url = \"http://cards.internal:8080/\"\nsession_file = {:?}\nlogin_path = \"/signin\"\n",
                session.to_string_lossy()
            ),
        )?;

        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.api_base_url, "http://cards.internal:8080");
        assert_eq!(config.session_file, session);
        assert_eq!(config.login_path, "/signin");
        assert_eq!(config.cards_path, DEFAULT_CARDS_PATH);
        Ok(())
    }

    #[test]
    fn default_config_is_written_once_and_parses() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("config.toml");
        write_default_config(path.clone())?;
        fs::write(&path, format!("{DEFAULT_CONFIG}\n# edited\n"))?;
        write_default_config(path.clone())?;
        assert!(fs::read_to_string(&path)?.ends_with("# edited\n"));

        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.api_base_url, "http://localhost:3001");
        Ok(())
    }
}
