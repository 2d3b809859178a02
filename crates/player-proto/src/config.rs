use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub controls: ControlsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned for playable files.
    #[serde(default = "default_songs_dir")]
    pub songs_dir: PathBuf,
    /// Directory of playlist definitions (one track name per line).
    /// Empty means `<config_dir>/playlists`.
    #[serde(default)]
    pub playlists_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_volume")]
    pub default_volume: u8,
    /// Extra wait after the control socket appears before a restored seek.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Upper bound on waiting for a freshly started engine's socket.
    #[serde(default = "default_socket_wait_ms")]
    pub socket_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlsConfig {
    #[serde(default = "default_seek_step")]
    pub seek_step_secs: f64,
    #[serde(default = "default_volume_step")]
    pub volume_step: u8,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            songs_dir: default_songs_dir(),
            playlists_dir: PathBuf::new(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            socket_path: default_socket_path(),
            default_volume: default_volume(),
            settle_ms: default_settle_ms(),
            socket_wait_ms: default_socket_wait_ms(),
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            seek_step_secs: default_seek_step(),
            volume_step: default_volume_step(),
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_songs_dir() -> PathBuf {
    PathBuf::from("songs")
}

fn default_binary() -> PathBuf {
    PathBuf::from(platform::mpv_binary_name())
}

fn default_socket_path() -> PathBuf {
    platform::mpv_socket_path()
}

fn default_volume() -> u8 {
    100
}

fn default_settle_ms() -> u64 {
    200
}

fn default_socket_wait_ms() -> u64 {
    2000
}

fn default_seek_step() -> f64 {
    5.0
}

fn default_volume_step() -> u8 {
    5
}

fn default_tick_ms() -> u64 {
    250
}

impl Config {
    /// Load `<config_dir>/config.toml`, writing the defaults on first run.
    pub fn load(home: &Path) -> anyhow::Result<Self> {
        let config_path = Self::config_path(home);

        if !config_path.exists() {
            let config = Self::default();
            config.save(home)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    /// Like `load`, but a missing or broken file never stops startup.
    pub fn load_or_default(home: &Path) -> Self {
        match Self::load(home) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "config: {} unusable, using defaults: {}",
                    Self::config_path(home).display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, home: &Path) -> anyhow::Result<()> {
        let config_path = Self::config_path(home);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path(home: &Path) -> PathBuf {
        platform::config_dir(home).join("config.toml")
    }

    pub fn playlists_dir(&self, home: &Path) -> PathBuf {
        if self.paths.playlists_dir.as_os_str().is_empty() {
            platform::config_dir(home).join("playlists")
        } else {
            self.paths.playlists_dir.clone()
        }
    }
}
