use crate::config::constants::paths;
use crate::config::{LoggingConfig, ServerConfig, StreamingSettings, VerificationConfig};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure for streamchat
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StreamChatConfig {
    /// Assistant service endpoints
    #[serde(default)]
    pub server: ServerConfig,

    /// Stream consumer behaviour
    #[serde(default)]
    pub streaming: StreamingSettings,

    /// Link verification behaviour
    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StreamChatConfig {
    /// Write the default configuration to `output`.
    ///
    /// Refuses to replace an existing file unless `force` is set.
    pub fn create_sample_config<P: AsRef<Path>>(output: P, force: bool) -> Result<()> {
        let output = output.as_ref();
        if output.exists() && !force {
            bail!(
                "Config file already exists: {} (use --force to overwrite)",
                output.display()
            );
        }

        let config_content = toml::to_string_pretty(&StreamChatConfig::default())
            .context("Failed to serialize default configuration")?;

        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        fs::write(output, config_content)
            .with_context(|| format!("Failed to write config file: {}", output.display()))?;

        Ok(())
    }

    /// Apply `STREAMCHAT_BASE_URL`. The process environment wins over the
    /// first `.env` file in `dotenv_dirs` that sets it.
    fn apply_env_overrides(&mut self, dotenv_dirs: &[PathBuf]) {
        let from_env = std::env::var(paths::BASE_URL_ENV).ok();
        let base_url = from_env.or_else(|| {
            dotenv_dirs
                .iter()
                .find_map(|dir| dotenv_value(&dir.join(".env"), paths::BASE_URL_ENV))
        });

        if let Some(base_url) = base_url {
            let trimmed = base_url.trim();
            if !trimmed.is_empty() {
                debug!(base_url = %trimmed, "base url overridden from environment");
                self.server.base_url = trimmed.to_string();
            }
        }
    }
}

/// Value of `key` in the `.env` file at `path`, if the file exists and sets it
fn dotenv_value(path: &Path, key: &str) -> Option<String> {
    let entries = dotenvy::from_path_iter(path).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .find(|(name, _)| name == key)
        .map(|(_, value)| value)
}

/// Configuration manager for loading and validating configurations
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: StreamChatConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        Self::load_from_workspace(std::env::current_dir()?)
    }

    /// Load configuration from a specific workspace.
    ///
    /// Search order: `<workspace>/streamchat.toml`,
    /// `<workspace>/.streamchat/streamchat.toml`, `~/.streamchat/streamchat.toml`.
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        let workspace = workspace.as_ref();
        let dotenv_dirs = [workspace.to_path_buf()];

        let mut candidates = vec![
            workspace.join(paths::CONFIG_FILE_NAME),
            workspace
                .join(paths::CONFIG_DIR_NAME)
                .join(paths::CONFIG_FILE_NAME),
        ];
        if let Some(home) = dirs::home_dir() {
            candidates.push(
                home.join(paths::CONFIG_DIR_NAME)
                    .join(paths::CONFIG_FILE_NAME),
            );
        }

        for candidate in candidates {
            if candidate.exists() {
                return Self::read_file(&candidate, &dotenv_dirs);
            }
        }

        let mut config = StreamChatConfig::default();
        config.apply_env_overrides(&dotenv_dirs);
        Ok(Self {
            config,
            config_path: None,
        })
    }

    /// Load configuration from a specific file.
    ///
    /// `.env` is looked up next to the file, then in the current directory.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut dotenv_dirs = Vec::new();
        if let Some(parent) = path.parent() {
            dotenv_dirs.push(parent.to_path_buf());
        }
        if let Ok(cwd) = std::env::current_dir() {
            dotenv_dirs.push(cwd);
        }
        Self::read_file(path, &dotenv_dirs)
    }

    fn read_file(path: &Path, dotenv_dirs: &[PathBuf]) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: StreamChatConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides(dotenv_dirs);

        debug!(path = %path.display(), "loaded configuration");

        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &StreamChatConfig {
        &self.config
    }

    pub fn into_config(self) -> StreamChatConfig {
        self.config
    }

    /// Path the configuration was read from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
