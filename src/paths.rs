//! Config and preset locations for portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds only): `config.yaml` in the working directory
//!   puts every file next to it.
//! - **Portable mode**: a `.portable` marker file next to the executable keeps
//!   all data in the executable's directory.
//! - **Installed mode** (default): data lives in the platform data directory
//!   (`%APPDATA%\Sensor MIDI Mapper`, `~/.local/share/Sensor MIDI Mapper`).

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
const APP_NAME: &str = "Sensor MIDI Mapper";

/// Preset file name inside the data directory
const PRESET_FILE: &str = "preset.json";

/// Application paths for config and preset.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the autosaved preset
    pub preset: PathBuf,
    /// Whether running in portable mode (data next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                eprintln!("[paths] Running in DEV mode (config.yaml found in {})", cwd.display());
                return Self::in_dir(&cwd, true);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::in_dir(&exe_dir, true);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no platform data directory, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] Running in INSTALLED mode (data dir: {})", app_data.display());

        Self::in_dir(&app_data, false)
    }

    /// Lay out all files under one base directory
    pub fn in_dir(base: &Path, is_portable: bool) -> Self {
        Self {
            config: base.join("config.yaml"),
            preset: base.join(PRESET_FILE),
            is_portable,
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        let dir = self.base_dir();
        if !dir.exists() {
            debug!("Creating data directory: {}", dir.display());
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}
