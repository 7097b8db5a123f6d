//! Layered configuration: defaults, TOML file, environment.
//!
//! Environment keys use the `VOXARCHIVE__SECTION__KEY` form. `ELEVENLABS_API_KEY`
//! is honoured last so the key never has to live in the config file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};

use crate::client::HistoryClientConfig;
use crate::store::{ArchiveLayout, CollisionPolicy};

pub const APP_NAME: &str = "voxarchive";

/// Environment variable holding the ElevenLabs API key.
pub const API_KEY_ENV: &str = "ELEVENLABS_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub elevenlabs: ElevenLabsConfig,
    pub archive: ArchiveConfig,
    pub sync: SyncConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Remote API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevenLabsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Skip every network call; runs end immediately as disabled.
    pub disable_downloads: bool,
    pub request_timeout_secs: u64,
    /// Total attempts per request, not extra retries.
    pub retries: u32,
    pub backoff_unit_ms: u64,
    pub page_size: u32,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            disable_downloads: false,
            request_timeout_secs: 30,
            retries: 3,
            backoff_unit_ms: 1000,
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Archive root. Defaults to `<data dir>/voxarchive/logs`.
    pub data_dir: Option<String>,
    pub collision_policy: CollisionPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Start a run every this many seconds while serving.
    pub interval_secs: Option<u64>,
    /// Start a run as soon as the server is up.
    pub sync_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Required on start/stop requests when set.
    pub control_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            control_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Fail when network access is enabled but no API key is configured.
    pub fn validate(&self) -> Result<()> {
        let has_key = self
            .elevenlabs
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if !self.elevenlabs.disable_downloads && !has_key {
            return Err(anyhow!(
                "no ElevenLabs API key configured; set {API_KEY_ENV} or elevenlabs.api_key, \
                 or set elevenlabs.disable_downloads = true"
            ));
        }
        if self.elevenlabs.retries == 0 {
            return Err(anyhow!("elevenlabs.retries must be at least 1"));
        }
        if self.sync.interval_secs == Some(0) {
            return Err(anyhow!("sync.interval_secs must be greater than zero"));
        }
        Ok(())
    }

    pub fn api_key(&self) -> &str {
        self.elevenlabs.api_key.as_deref().unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.elevenlabs.request_timeout_secs)
    }

    pub fn client_config(&self) -> HistoryClientConfig {
        let e = &self.elevenlabs;
        HistoryClientConfig {
            base_url: e.base_url.clone(),
            disabled: e.disable_downloads,
            retries: e.retries,
            backoff_unit: Duration::from_millis(e.backoff_unit_ms),
            page_size: e.page_size,
        }
    }

    /// Resolved archive root, with `~` and variables expanded.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match self.archive.data_dir {
            Some(ref dir) => expand_str_path(dir),
            None => Ok(default_data_dir()?.join("logs")),
        }
    }

    pub fn archive_layout(&self) -> Result<ArchiveLayout> {
        Ok(ArchiveLayout::new(
            self.data_dir()?,
            self.archive.collision_policy,
        ))
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync
            .interval_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.elevenlabs.api_key.is_some() {
            copy.elevenlabs.api_key = Some("********".to_string());
        }
        if copy.server.control_token.is_some() {
            copy.server.control_token = Some("********".to_string());
        }
        copy
    }
}

/// Load configuration from `path` (optional) and the process environment.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let api_key = env::var(API_KEY_ENV).ok();
    load_config_from(path, None, api_key)
}

/// Load configuration with an explicit environment.
///
/// `env_source` replaces the process environment for the `VOXARCHIVE__*` layer
/// when given.
pub fn load_config_from(
    path: &Path,
    env_source: Option<Map<String, String>>,
    api_key_env: Option<String>,
) -> Result<AppConfig> {
    let built = Config::builder()
        .set_default("logging.level", "info")?
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(&env_prefix())
                .separator("__")
                .source(env_source),
        )
        .build()
        .with_context(|| format!("loading config from {}", path.display()))?;

    let mut config: AppConfig = built
        .try_deserialize()
        .context("parsing configuration")?;

    if let Some(key) = api_key_env.filter(|k| !k.trim().is_empty()) {
        config.elevenlabs.api_key = Some(key);
    }

    Ok(config)
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let toml = toml::to_string_pretty(&AppConfig::default())
        .context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    format!(
        "# Configuration for {APP_NAME}\n# File: {}\n# The API key is best provided via {API_KEY_ENV}.\n\n",
        path.display()
    )
}

/// Config file location: explicit override (file or directory) or the XDG default.
pub fn resolve_config_file(override_path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match override_path {
        Some(path) => {
            let expanded = expand_path(path)?;
            if expanded.is_dir() {
                expanded.join("config.toml")
            } else {
                expanded
            }
        }
        None => default_config_dir()?.join("config.toml"),
    };
    if path.parent().is_none() {
        return Err(anyhow!("invalid config file path: {path:?}"));
    }
    Ok(path)
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    match path.to_str() {
        Some(text) => expand_str_path(text),
        None => Ok(path),
    }
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }
    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME));
    }
    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }
    if let Some(dir) = dirs::data_dir() {
        return Ok(dir.join(APP_NAME));
    }
    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}

fn env_prefix() -> String {
    APP_NAME.to_ascii_uppercase()
}
