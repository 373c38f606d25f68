//! Preset file watcher for hot-reload support
//!
//! The parent directory is watched instead of the file itself: the autosave
//! replaces the preset with a rename, which would orphan a watch on the old
//! inode.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::preset::persistence::load_from_file;
use crate::preset::ImportedPreset;

/// Delay before reading a changed file so the writer can finish
const SETTLE_MS: u64 = 100;

/// Watches a preset file and yields freshly parsed presets
pub struct PresetWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<ImportedPreset>,
}

impl PresetWatcher {
    /// Start watching `preset_path`. Must be called inside a tokio runtime.
    pub fn new(preset_path: impl Into<PathBuf>) -> Result<Self> {
        let preset_path: PathBuf = preset_path.into();
        let (tx, rx) = mpsc::channel(4);

        let watch_dir = preset_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&watch_dir)
            .with_context(|| format!("Failed to create preset directory: {}", watch_dir.display()))?;

        let file_name = preset_path.file_name().map(|n| n.to_os_string());
        let target = preset_path.clone();

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let touches_preset = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_preset {
                        return;
                    }
                    debug!("Preset file changed: {:?}", event.paths);

                    let path = target.clone();
                    let tx = tx.clone();
                    runtime_handle.spawn(async move {
                        tokio::time::sleep(Duration::from_millis(SETTLE_MS)).await;

                        match load_from_file(&path).await {
                            Ok(Some(preset)) => {
                                if let Err(e) = tx.send(preset).await {
                                    error!("Failed to send preset update: {}", e);
                                }
                            }
                            Ok(None) => debug!("Preset file removed, keeping current mappings"),
                            Err(e) => {
                                warn!("Failed to reload preset (keeping current mappings): {:#}", e)
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch preset directory: {}", watch_dir.display()))?;

        info!("Preset watcher started for: {}", preset_path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next reloaded preset; `None` once the watcher is closed
    pub async fn next_preset(&mut self) -> Option<ImportedPreset> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SensorKey;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_preset_watcher_reloads() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let preset_path = temp_dir.path().join("preset.json");
        fs::write(&preset_path, r#"{"mappingsByDevice":{}}"#)?;

        let mut watcher = PresetWatcher::new(&preset_path)?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(
            &preset_path,
            r#"{"selectedOutputId":"Synth","mappingsByDevice":{"d1":{"tap":{"enabled":true}}}}"#,
        )?;

        let reloaded = tokio::time::timeout(Duration::from_secs(2), watcher.next_preset()).await?;

        assert!(reloaded.is_some(), "watcher closed without a reload");
        let preset = reloaded.unwrap();
        assert_eq!(preset.selected_output_id.as_deref(), Some("Synth"));
        assert!(preset.store.get("d1").map_or(false, |m| m[SensorKey::Tap].enabled));

        Ok(())
    }
}
