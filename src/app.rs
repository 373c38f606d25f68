//! Composition root for the mapper
//!
//! `MapperApp` owns every piece of mutable mapping state: the mapping store,
//! the engine's runtime state and Note-Off schedule, solo snapshots, pending
//! debounced edits and the selected output. The binary drives it from a
//! single task; nothing here is shared or locked.

use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::device::DeviceCollection;
use crate::engine::MappingEngine;
use crate::mapping::edit::{apply_edit, parse_input};
use crate::mapping::{
    EditOutcome, FieldDebouncer, MappingField, MappingStore, OutputKind, PendingEdit, SensorKey,
    SoloSnapshots,
};
use crate::preset::{self, ImportedPreset, Preset, PresetError};
use crate::transport::MidiTransport;

pub struct MapperApp {
    store: MappingStore,
    engine: MappingEngine,
    solo: SoloSnapshots,
    debouncer: FieldDebouncer,
    selected_output_id: Option<String>,
    dirty: bool,
}

impl MapperApp {
    /// Empty state; typed channel/CC/note edits wait for `edit_quiet`
    pub fn new(edit_quiet: Duration) -> Self {
        Self {
            store: MappingStore::new(),
            engine: MappingEngine::new(),
            solo: SoloSnapshots::new(),
            debouncer: FieldDebouncer::new(edit_quiet),
            selected_output_id: None,
            dirty: false,
        }
    }

    /// One display tick: commit quiet edits, fire due Note-Offs, map devices
    pub fn tick<D, T>(&mut self, devices: &D, transport: &T, now: Instant)
    where
        D: DeviceCollection + ?Sized,
        T: MidiTransport + ?Sized,
    {
        self.commit_due_edits(now);
        self.engine.poll_note_offs(now, transport);
        self.engine
            .process_all_devices(devices, &mut self.store, transport, now);
    }

    /// Apply typed text to a numeric field.
    ///
    /// Channel, CC and note numbers are deferred until typing goes quiet;
    /// everything else applies at once.
    pub fn edit_field(
        &mut self,
        device_id: &str,
        key: SensorKey,
        field: MappingField,
        raw: &str,
        now: Instant,
    ) -> EditOutcome {
        let value = parse_input(raw);

        if field.is_debounced() {
            let mut candidate = self.store.ensure(device_id)[key].clone();
            if apply_edit(&mut candidate, field, value) == EditOutcome::NotApplicable {
                debug!(
                    "Ignoring {} edit on {} {} ({} mapping)",
                    field,
                    device_id,
                    key,
                    candidate.kind().as_str()
                );
                return EditOutcome::NotApplicable;
            }
            self.debouncer.schedule(device_id, key, field, value, now);
            return EditOutcome::Deferred;
        }

        self.commit(device_id, key, field, value)
    }

    /// Commit debounced edits whose quiet period has elapsed
    pub fn commit_due_edits(&mut self, now: Instant) -> usize {
        let due = self.debouncer.take_due(now);
        self.commit_all(due)
    }

    /// Commit every pending edit now (e.g. before shutdown)
    pub fn flush_edits(&mut self) -> usize {
        let pending = self.debouncer.flush_all();
        self.commit_all(pending)
    }

    fn commit_all(&mut self, edits: Vec<PendingEdit>) -> usize {
        edits
            .into_iter()
            .filter(|e| self.commit(&e.device_id, e.key, e.field, e.value) == EditOutcome::Applied)
            .count()
    }

    fn commit(&mut self, device_id: &str, key: SensorKey, field: MappingField, value: f64) -> EditOutcome {
        let mapping = &mut self.store.ensure(device_id)[key];
        let outcome = apply_edit(mapping, field, value);
        match outcome {
            EditOutcome::Applied => {
                debug!("Edit {} {}.{} <- {}", device_id, key, field, value);
                self.dirty = true;
            }
            _ => debug!(
                "Ignoring {} edit on {} {} ({} mapping)",
                field,
                device_id,
                key,
                mapping.kind().as_str()
            ),
        }
        outcome
    }

    /// Commit pending edits and release held notes before exit
    pub fn shutdown<T: MidiTransport + ?Sized>(&mut self, transport: &T) {
        let committed = self.flush_edits();
        let released = self.engine.release_all_notes(transport);
        info!(
            "Mapper stopped ({} edit(s) committed, {} note(s) released)",
            committed, released
        );
    }

    /// Add or remove a mapping from the live set
    pub fn set_enabled(&mut self, device_id: &str, key: SensorKey, enabled: bool) {
        self.store.ensure(device_id)[key].enabled = enabled;
        self.dirty = true;
    }

    pub fn set_invert(&mut self, device_id: &str, key: SensorKey, invert: bool) {
        self.store.ensure(device_id)[key].invert = invert;
        self.dirty = true;
    }

    /// Switch between CC and Note output for a mapping
    pub fn set_output_kind(&mut self, device_id: &str, key: SensorKey, kind: OutputKind) {
        self.store.ensure(device_id)[key].set_kind(kind, key);
        self.dirty = true;
    }

    pub fn set_solo(&mut self, device_id: &str, key: SensorKey, on: bool) {
        self.solo.toggle(&mut self.store, device_id, key, on);
        self.dirty = true;
    }

    /// Change the selected output. Pending Note-Offs are dropped, not sent.
    pub fn select_output(&mut self, output_id: Option<String>) -> usize {
        if output_id == self.selected_output_id {
            return 0;
        }
        let cancelled = self.engine.cancel_pending_note_offs();
        info!(
            "MIDI output selection: {} ({} pending Note-Off(s) dropped)",
            output_id.as_deref().unwrap_or("none"),
            cancelled
        );
        self.selected_output_id = output_id;
        self.dirty = true;
        cancelled
    }

    /// Replace all mappings with an imported preset.
    ///
    /// On failure nothing changes.
    pub fn import_preset(&mut self, json: &str) -> Result<(), PresetError> {
        let imported = preset::import_json(json).inspect_err(|e| {
            error!("Preset import failed: {}", e);
        })?;
        self.replace_with(imported);
        self.dirty = true;
        Ok(())
    }

    /// Adopt a preset re-read from disk; false when it matches current state
    pub fn reload_preset(&mut self, imported: ImportedPreset) -> bool {
        if imported.store == self.store && imported.selected_output_id == self.selected_output_id {
            debug!("Preset on disk matches current state");
            return false;
        }
        self.replace_with(imported);
        true
    }

    fn replace_with(&mut self, imported: ImportedPreset) {
        if imported.selected_output_id != self.selected_output_id {
            self.engine.cancel_pending_note_offs();
        }
        info!("Preset applied: {} device(s)", imported.store.len());
        self.store = imported.store;
        self.selected_output_id = imported.selected_output_id;
        self.solo.clear();
        self.debouncer.clear();
    }

    pub fn export_preset(&self) -> Result<String, PresetError> {
        preset::export_json(&self.store, self.selected_output_id.as_deref())
    }

    /// Capture current state for autosave
    pub fn preset(&self) -> Preset {
        Preset::capture(&self.store, self.selected_output_id.as_deref())
    }

    /// True once after any committed change
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn engine(&self) -> &MappingEngine {
        &self.engine
    }

    pub fn selected_output_id(&self) -> Option<&str> {
        self.selected_output_id.as_deref()
    }

    pub fn pending_edits(&self) -> usize {
        self.debouncer.len()
    }
}

impl Default for MapperApp {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::mapping::debounce::DEFAULT_QUIET_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceRegistry, SensorSnapshot};
    use crate::mapping::MappingTarget;
    use crate::midi::MidiMessage;
    use crate::transport::RecordingTransport;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn registry_with(id: &str, ax: f64, tap: bool, now: Instant) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry.upsert(
            SensorSnapshot {
                id: id.to_string(),
                ax,
                tap,
                ..SensorSnapshot::default()
            },
            now,
        );
        registry
    }

    #[test]
    fn test_debounced_cc_edit_commits_on_tick() {
        let mut app = MapperApp::default();
        let start = Instant::now();
        app.set_enabled("d1", SensorKey::Ax, true);
        app.take_dirty();

        assert_eq!(
            app.edit_field("d1", SensorKey::Ax, MappingField::CcNumber, "1", start),
            EditOutcome::Deferred
        );
        app.edit_field("d1", SensorKey::Ax, MappingField::CcNumber, "12", start + ms(300));

        let devices = registry_with("d1", 255.0, false, start);
        let transport = RecordingTransport::new();

        app.tick(&devices, &transport, start + ms(1000));
        assert_eq!(app.store().get("d1").unwrap()[SensorKey::Ax].cc_number(), Some(1));
        assert!(!app.take_dirty());

        transport.take();
        app.tick(&devices, &transport, start + ms(1300));
        assert_eq!(app.store().get("d1").unwrap()[SensorKey::Ax].cc_number(), Some(12));
        assert!(app.take_dirty());
        assert_eq!(
            transport.messages(),
            vec![MidiMessage::ControlChange {
                channel: 0,
                cc: 12,
                value: 127
            }]
        );
    }

    #[test]
    fn test_immediate_edit_and_not_applicable() {
        let mut app = MapperApp::default();
        let now = Instant::now();

        assert_eq!(
            app.edit_field("d1", SensorKey::Tap, MappingField::DurationMs, "5000", now),
            EditOutcome::Applied
        );
        assert!(matches!(
            app.store().get("d1").unwrap()[SensorKey::Tap].target,
            MappingTarget::Note { duration_ms: 2000, .. }
        ));

        assert_eq!(
            app.edit_field("d1", SensorKey::Tap, MappingField::CcNumber, "7", now),
            EditOutcome::NotApplicable
        );
        assert_eq!(app.pending_edits(), 0);
    }

    #[test]
    fn test_flush_edits_commits_pending() {
        let mut app = MapperApp::default();
        let now = Instant::now();
        app.edit_field("d1", SensorKey::Ay, MappingField::Channel, "10", now);

        assert_eq!(app.flush_edits(), 1);
        assert_eq!(app.store().get("d1").unwrap()[SensorKey::Ay].channel, 10);
    }

    #[test]
    fn test_select_output_drops_note_offs() {
        let mut app = MapperApp::default();
        let now = Instant::now();
        app.set_enabled("d1", SensorKey::Tap, true);

        let devices = registry_with("d1", 0.0, true, now);
        let transport = RecordingTransport::new();
        app.tick(&devices, &transport, now);
        assert_eq!(app.engine().pending_note_off_count(), 1);

        assert_eq!(app.select_output(Some("Other".to_string())), 1);
        app.tick(&devices, &transport, now + ms(500));
        assert!(!transport
            .messages()
            .iter()
            .any(|m| matches!(m, MidiMessage::NoteOff { .. })));
    }

    #[test]
    fn test_shutdown_releases_held_notes() {
        let mut app = MapperApp::default();
        let now = Instant::now();
        app.set_enabled("d1", SensorKey::Tap, true);

        let devices = registry_with("d1", 0.0, true, now);
        let transport = RecordingTransport::new();
        app.tick(&devices, &transport, now);
        transport.take();

        app.shutdown(&transport);
        assert_eq!(
            transport.messages(),
            vec![MidiMessage::NoteOff {
                channel: 0,
                note: 60,
                velocity: 0
            }]
        );
        assert_eq!(app.engine().pending_note_off_count(), 0);
    }

    #[test]
    fn test_failed_import_leaves_state_untouched() {
        let mut app = MapperApp::default();
        app.set_enabled("d1", SensorKey::Az, true);
        app.select_output(Some("Port".to_string()));
        let before = app.store().clone();

        assert!(app.import_preset("[]").is_err());
        assert!(app.import_preset("{oops").is_err());

        assert_eq!(app.store(), &before);
        assert_eq!(app.selected_output_id(), Some("Port"));
    }

    #[test]
    fn test_import_replaces_state() {
        let mut app = MapperApp::default();
        app.set_enabled("old", SensorKey::Ax, true);
        app.take_dirty();

        let json = r#"{"selectedOutputId":"Synth","mappingsByDevice":{"new":{"ay":{"enabled":true}}}}"#;
        app.import_preset(json).unwrap();

        assert!(app.store().get("old").is_none());
        assert!(app.store().get("new").unwrap()[SensorKey::Ay].enabled);
        assert_eq!(app.selected_output_id(), Some("Synth"));
        assert!(app.take_dirty());
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut app = MapperApp::default();
        app.set_enabled("d1", SensorKey::Magnitude, true);
        app.set_invert("d1", SensorKey::Magnitude, true);
        app.set_output_kind("d1", SensorKey::Ax, OutputKind::Note);
        app.select_output(Some("Out".to_string()));

        let json = app.export_preset().unwrap();
        let mut other = MapperApp::default();
        other.import_preset(&json).unwrap();

        assert_eq!(other.store(), app.store());
        assert_eq!(other.selected_output_id(), Some("Out"));
    }

    #[test]
    fn test_reload_of_identical_preset_is_noop() {
        let mut app = MapperApp::default();
        app.set_enabled("d1", SensorKey::Ax, true);
        app.take_dirty();

        let same = preset::import_json(&app.export_preset().unwrap()).unwrap();
        assert!(!app.reload_preset(same));

        let changed = preset::import_json(r#"{"mappingsByDevice":{}}"#).unwrap();
        assert!(app.reload_preset(changed));
        assert!(app.store().is_empty());
        assert!(!app.take_dirty());
    }

    #[test]
    fn test_solo_through_app() {
        let mut app = MapperApp::default();
        app.set_enabled("d1", SensorKey::Ax, true);
        app.set_enabled("d1", SensorKey::Tap, true);

        app.set_solo("d1", SensorKey::Ay, true);
        assert_eq!(
            app.store().get("d1").unwrap().enabled_keys(),
            vec![SensorKey::Ay]
        );

        app.set_solo("d1", SensorKey::Ay, false);
        assert_eq!(
            app.store().get("d1").unwrap().enabled_keys(),
            vec![SensorKey::Ax, SensorKey::Tap]
        );
    }
}
