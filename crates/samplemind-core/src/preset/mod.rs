//! Preset bank - 128 named parameter snapshots
//!
//! The bank is allocated once with a fixed number of slots; slots are only
//! ever overwritten. A slot with an empty name is unoccupied, so saving an
//! empty name is how a preset gets deleted.
//!
//! Presets are a host-thread concern: the audio thread and the analysis
//! worker never touch the bank. All parameter access goes through the
//! [`ParameterRegistry`] so loading re-applies range clamping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::params::{ParamId, ParameterRegistry};

/// Number of preset slots (indices 0..128)
pub const PRESET_SLOT_COUNT: usize = 128;

/// One named snapshot of parameter values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetSlot {
    pub name: String,
    pub values: BTreeMap<ParamId, f32>,
}

impl PresetSlot {
    /// A slot is occupied once it carries a non-empty name
    pub fn is_occupied(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Fixed bank of preset slots
#[derive(Debug, Clone)]
pub struct PresetStore {
    slots: Vec<PresetSlot>,
}

impl Default for PresetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PresetStore {
    pub fn new() -> Self {
        Self {
            slots: vec![PresetSlot::default(); PRESET_SLOT_COUNT],
        }
    }

    /// Number of slots (always [`PRESET_SLOT_COUNT`])
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Capture every registered parameter into `slot` under `name`
    ///
    /// Unconditionally replaces whatever the slot held before.
    pub fn save(&mut self, slot: usize, name: &str, registry: &ParameterRegistry) -> PipelineResult<()> {
        let target = self
            .slots
            .get_mut(slot)
            .ok_or(PipelineError::SlotOutOfRange(slot))?;

        target.name = name.to_string();
        target.values = registry.iter().map(|p| (p.id(), p.value())).collect();

        if name.is_empty() {
            log::info!("Preset slot {} cleared", slot);
        } else {
            log::info!(
                "Preset '{}' saved to slot {} ({} parameters)",
                name,
                slot,
                target.values.len()
            );
        }
        Ok(())
    }

    /// Apply the snapshot in `slot` to the registry
    ///
    /// Values go through `ParameterRegistry::set`, so they are clamped to the
    /// current ranges. Ids that are no longer registered are skipped.
    /// Returns the number of parameters applied.
    pub fn load(&self, slot: usize, registry: &ParameterRegistry) -> PipelineResult<usize> {
        let preset = self.slots.get(slot).ok_or(PipelineError::SlotOutOfRange(slot))?;
        if !preset.is_occupied() {
            return Err(PipelineError::EmptySlot(slot));
        }

        let applied = preset
            .values
            .iter()
            .filter(|(&id, &value)| registry.set(id, value).is_ok())
            .count();

        log::info!(
            "Preset '{}' loaded from slot {} ({}/{} parameters applied)",
            preset.name,
            slot,
            applied,
            preset.values.len()
        );
        Ok(applied)
    }

    /// Read-only view of a slot
    pub fn slot(&self, slot: usize) -> PipelineResult<&PresetSlot> {
        self.slots.get(slot).ok_or(PipelineError::SlotOutOfRange(slot))
    }

    /// Replace a slot wholesale (used when restoring persisted state)
    pub fn replace(&mut self, slot: usize, preset: PresetSlot) -> PipelineResult<()> {
        let target = self
            .slots
            .get_mut(slot)
            .ok_or(PipelineError::SlotOutOfRange(slot))?;
        *target = preset;
        Ok(())
    }

    /// Occupied slots with their indices
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &PresetSlot)> {
        self.slots.iter().enumerate().filter(|(_, p)| p.is_occupied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameter;

    fn registry() -> ParameterRegistry {
        let mut registry = ParameterRegistry::new();
        registry.register(Parameter::new(1, "Sensitivity", 0.0, 1.0, 0.5)).unwrap();
        registry.register(Parameter::new(2, "Tempo Hint", 60.0, 200.0, 120.0)).unwrap();
        registry
    }

    #[test]
    fn test_save_load_roundtrip() {
        let registry = registry();
        let mut store = PresetStore::new();

        registry.set(1, 0.8).unwrap();
        registry.set(2, 96.0).unwrap();
        store.save(5, "x", &registry).unwrap();

        registry.set(1, 0.1).unwrap();
        registry.set(2, 180.0).unwrap();

        assert_eq!(store.load(5, &registry).unwrap(), 2);
        assert_eq!(registry.get(1).unwrap(), 0.8);
        assert_eq!(registry.get(2).unwrap(), 96.0);
    }

    #[test]
    fn test_load_never_saved_slot() {
        let registry = registry();
        let store = PresetStore::new();
        assert_eq!(store.load(0, &registry), Err(PipelineError::EmptySlot(0)));
        assert_eq!(store.load(127, &registry), Err(PipelineError::EmptySlot(127)));
    }

    #[test]
    fn test_slot_out_of_range() {
        let registry = registry();
        let mut store = PresetStore::new();
        assert_eq!(store.count(), 128);
        assert_eq!(store.save(128, "x", &registry), Err(PipelineError::SlotOutOfRange(128)));
        assert_eq!(store.load(128, &registry), Err(PipelineError::SlotOutOfRange(128)));
        assert_eq!(store.load(usize::MAX, &registry), Err(PipelineError::SlotOutOfRange(usize::MAX)));
    }

    #[test]
    fn test_empty_name_deletes() {
        let registry = registry();
        let mut store = PresetStore::new();
        store.save(3, "Warm", &registry).unwrap();
        assert!(store.load(3, &registry).is_ok());

        store.save(3, "", &registry).unwrap();
        assert_eq!(store.load(3, &registry), Err(PipelineError::EmptySlot(3)));
        assert_eq!(store.occupied().count(), 0);
    }

    #[test]
    fn test_load_reclamps_and_skips_unknown_ids() {
        let registry = registry();
        let mut store = PresetStore::new();

        let mut values = BTreeMap::new();
        values.insert(1, 4.0); // stale capture from a wider range
        values.insert(42, 1.0); // no longer registered
        store
            .replace(9, PresetSlot { name: "Stale".into(), values })
            .unwrap();

        assert_eq!(store.load(9, &registry).unwrap(), 1);
        assert_eq!(registry.get(1).unwrap(), 1.0);
    }

    #[test]
    fn test_save_overwrites_previous_capture() {
        let mut registry = registry();
        let mut store = PresetStore::new();
        store.save(0, "First", &registry).unwrap();

        registry.register(Parameter::new(3, "Gain", -24.0, 12.0, 0.0)).unwrap();
        store.save(0, "Second", &registry).unwrap();

        let slot = store.slot(0).unwrap();
        assert_eq!(slot.name, "Second");
        assert_eq!(slot.values.len(), 3);
    }
}
