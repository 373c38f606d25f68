//! Configuration management for the sensor MIDI mapper
//!
//! Handles loading, validating and saving the YAML configuration file. Every
//! section and field has a default, so an empty file (or no file at all) is a
//! valid configuration.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub use watcher::PresetWatcher;

/// Highest accepted tick rate
pub const MAX_TICK_HZ: u32 = 240;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub preset: PresetConfig,
    #[serde(default)]
    pub input: InputConfig,
}

/// MIDI output configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Output port to open at startup (exact name or substring)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    /// Client name announced to the MIDI backend
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

/// Tick loop and timing configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Mapping passes per second
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Devices silent for this long are dropped (0 keeps them forever)
    #[serde(default = "default_device_timeout_ms")]
    pub device_timeout_ms: u64,
    /// Quiet period before typed channel/CC/note edits are committed
    #[serde(default = "default_edit_debounce_ms")]
    pub debounce_ms: u64,
}

/// Preset file configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PresetConfig {
    /// Preset file; defaults to `preset.json` in the data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub autosave: bool,
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,
    /// Reload the preset when the file changes on disk
    #[serde(default = "default_true")]
    pub watch: bool,
}

/// Sensor frame input configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InputConfig {
    /// JSON-lines file to read frames from; stdin when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            output_port: None,
            client_name: default_client_name(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            device_timeout_ms: default_device_timeout_ms(),
            debounce_ms: default_edit_debounce_ms(),
        }
    }
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            path: None,
            autosave: true,
            autosave_debounce_ms: default_autosave_debounce_ms(),
            watch: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document parses as null
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if let Some(port) = &self.midi.output_port {
            if port.trim().is_empty() {
                anyhow::bail!("midi.output_port cannot be empty (omit it to start without output)");
            }
        }
        if self.midi.client_name.trim().is_empty() {
            anyhow::bail!("midi.client_name cannot be empty");
        }

        if self.engine.tick_hz == 0 || self.engine.tick_hz > MAX_TICK_HZ {
            anyhow::bail!(
                "engine.tick_hz {} is out of range (must be 1-{})",
                self.engine.tick_hz,
                MAX_TICK_HZ
            );
        }
        if self.engine.debounce_ms > 10_000 {
            anyhow::bail!(
                "engine.debounce_ms {} is too long (max 10000)",
                self.engine.debounce_ms
            );
        }

        if let Some(path) = &self.preset.path {
            if path.as_os_str().is_empty() {
                anyhow::bail!("preset.path cannot be empty");
            }
        }

        Ok(())
    }

    /// Tick period derived from `engine.tick_hz`
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / u64::from(self.engine.tick_hz.max(1)))
    }
}

// Default value functions
fn default_client_name() -> String { "sensor-midi-mapper".to_string() }
fn default_tick_hz() -> u32 { 60 }
fn default_device_timeout_ms() -> u64 { 5000 }
fn default_edit_debounce_ms() -> u64 { crate::mapping::debounce::DEFAULT_QUIET_MS }
fn default_autosave_debounce_ms() -> u64 { crate::preset::persistence::DEFAULT_AUTOSAVE_DEBOUNCE_MS }
fn default_true() -> bool { true }
