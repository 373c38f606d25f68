//! Debounced preset autosave
//!
//! Mapping edits arrive in bursts (typing, solo toggles, imports). The saver
//! actor keeps only the most recent [`Preset`] and writes it once the burst
//! has been quiet for the debounce window. Writes go to a temporary file that
//! is then renamed over the target, so a crash never leaves a half-written
//! preset behind.

use super::{import_json, ImportedPreset, Preset};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};

/// Default autosave debounce window in milliseconds
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 500;

/// Commands sent to the saver actor
#[derive(Debug)]
pub enum SaverCommand {
    /// Queue a preset for writing (debounced, last one wins)
    Save(Preset),
    /// Write any pending preset now
    Flush(oneshot::Sender<Result<()>>),
    /// Write any pending preset and stop
    Shutdown,
}

/// Actor owning the preset file
pub struct PresetSaver {
    path: PathBuf,
    command_rx: mpsc::Receiver<SaverCommand>,
    pending: Option<Preset>,
    last_request: Instant,
    debounce_ms: u64,
    write_count: u64,
}

/// Cloneable handle to the saver actor
#[derive(Clone)]
pub struct PresetSaverHandle {
    cmd_tx: mpsc::Sender<SaverCommand>,
}

impl PresetSaver {
    /// Spawn the saver on the current tokio runtime.
    ///
    /// `debounce_ms = 0` writes every save immediately.
    pub fn spawn(path: impl Into<PathBuf>, debounce_ms: u64) -> PresetSaverHandle {
        let (cmd_tx, command_rx) = mpsc::channel(64);
        let actor = PresetSaver {
            path: path.into(),
            command_rx,
            pending: None,
            last_request: Instant::now(),
            debounce_ms,
            write_count: 0,
        };
        tokio::spawn(actor.run());
        PresetSaverHandle { cmd_tx }
    }

    async fn run(mut self) {
        info!(
            "Preset saver started for {} (debounce: {}ms)",
            self.path.display(),
            self.debounce_ms
        );

        let tick = self.debounce_ms.clamp(10, 1000);
        let mut ticker = tokio::time::interval(Duration::from_millis(tick));

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SaverCommand::Save(preset)) => {
                            trace!("Preset save queued");
                            self.pending = Some(preset);
                            self.last_request = Instant::now();
                            if self.debounce_ms == 0 {
                                if let Err(e) = self.flush_pending().await {
                                    error!("Preset save failed: {:#}", e);
                                }
                            }
                        }
                        Some(SaverCommand::Flush(reply)) => {
                            let result = self.flush_pending().await;
                            let _ = reply.send(result);
                        }
                        Some(SaverCommand::Shutdown) | None => {
                            if let Err(e) = self.flush_pending().await {
                                error!("Final preset save failed: {:#}", e);
                            }
                            info!("Preset saver stopped (total writes: {})", self.write_count);
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if self.pending.is_some()
                        && self.last_request.elapsed() >= Duration::from_millis(self.debounce_ms)
                    {
                        if let Err(e) = self.flush_pending().await {
                            error!("Preset autosave failed: {:#}", e);
                        }
                    }
                }
            }
        }
    }

    async fn flush_pending(&mut self) -> Result<()> {
        let Some(preset) = self.pending.take() else {
            return Ok(());
        };
        save_to_file(&preset, &self.path).await?;
        self.write_count += 1;
        trace!("Preset written (write #{})", self.write_count);
        Ok(())
    }
}

impl PresetSaverHandle {
    /// Queue a preset for writing
    pub async fn save(&self, preset: Preset) -> Result<()> {
        self.cmd_tx
            .send(SaverCommand::Save(preset))
            .await
            .context("Failed to send save command: saver shut down")
    }

    /// Write any pending preset and wait for the result
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SaverCommand::Flush(tx))
            .await
            .context("Failed to send flush command: saver shut down")?;
        rx.await.context("Failed to receive flush response")?
    }

    /// Ask the saver to write pending data and stop
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.try_send(SaverCommand::Shutdown);
    }
}

/// Write a preset atomically (temp file + rename)
pub async fn save_to_file(preset: &Preset, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = preset.to_json().context("Failed to serialize preset")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create preset directory {}", parent.display()))?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace preset file {}", path.display()))?;
    Ok(())
}

/// Read a preset file; `Ok(None)` when it does not exist
pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Option<ImportedPreset>> {
    let path = path.as_ref();
    let json = match fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No preset file at {}", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read preset file {}", path.display()))
        }
    };

    let imported = import_json(&json)
        .with_context(|| format!("Failed to parse preset file {}", path.display()))?;
    debug!(
        "Loaded preset from {} ({} device(s))",
        path.display(),
        imported.store.len()
    );
    Ok(Some(imported))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingStore, SensorKey};
    use tempfile::tempdir;

    fn preset_with_output(output: &str) -> Preset {
        let mut store = MappingStore::new();
        store.ensure("d1")[SensorKey::Az].enabled = true;
        Preset::capture(&store, Some(output))
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp = tempdir().unwrap();
        let loaded = load_from_file(temp.path().join("none.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_load_invalid_file_is_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("preset.json");
        std::fs::write(&path, "\"just a string\"").unwrap();
        assert!(load_from_file(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_round_trips() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("preset.json");

        save_to_file(&preset_with_output("Out 1"), &path).await.unwrap();
        let loaded = load_from_file(&path).await.unwrap().unwrap();

        assert_eq!(loaded.selected_output_id.as_deref(), Some("Out 1"));
        assert!(loaded.store.get("d1").unwrap()[SensorKey::Az].enabled);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_flush_forces_write() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("preset.json");
        let handle = PresetSaver::spawn(&path, 10_000);

        handle.save(preset_with_output("A")).await.unwrap();
        handle.flush().await.unwrap();

        assert!(path.exists());
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_immediate_write_failure_keeps_saver_running() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let handle = PresetSaver::spawn(blocker.join("preset.json"), 0);

        handle.save(preset_with_output("A")).await.unwrap();
        // The failed write is reported in the log, not retried
        handle.flush().await.unwrap();

        handle.save(preset_with_output("B")).await.unwrap();
        handle.flush().await.unwrap();
        assert!(blocker.is_file());
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_debounce_keeps_last_preset() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("preset.json");
        let handle = PresetSaver::spawn(&path, 100);

        for name in ["A", "B", "C"] {
            handle.save(preset_with_output(name)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        let loaded = load_from_file(&path).await.unwrap().unwrap();
        assert_eq!(loaded.selected_output_id.as_deref(), Some("C"));
        handle.shutdown();
    }
}
