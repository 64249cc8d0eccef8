//! Persisted plugin state
//!
//! The host stores the plugin's state as text inside its project file. The
//! document is JSON:
//!
//! ```json
//! {
//!   "plugin_name": "SampleMind AI",
//!   "plugin_version": "1.0.0",
//!   "parameters": { "Sensitivity": 0.5, "Tempo Hint": 120.0 },
//!   "presets": [ { "slot": 3, "name": "Warm", "values": { "1": 0.8 } } ]
//! }
//! ```
//!
//! Parameters are keyed by name so a document survives id renumbering.
//! Restoring validates the whole document before applying any of it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::params::{ParamId, ParameterRegistry};
use crate::preset::{PresetSlot, PresetStore, PRESET_SLOT_COUNT};
use crate::types::{PLUGIN_NAME, PLUGIN_VERSION};

/// One occupied preset slot in a state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub slot: usize,
    pub name: String,
    #[serde(default)]
    pub values: BTreeMap<ParamId, f32>,
}

/// Serializable snapshot of everything the host needs to restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginState {
    pub plugin_name: String,
    #[serde(default)]
    pub plugin_version: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
    #[serde(default)]
    pub presets: Vec<PresetEntry>,
}

impl PluginState {
    /// Capture current parameter values and occupied preset slots
    pub fn capture(registry: &ParameterRegistry, presets: &PresetStore) -> Self {
        // Duplicate names resolve to the first registered, as in lookups
        let mut parameters = BTreeMap::new();
        for param in registry.iter() {
            parameters.entry(param.name().to_string()).or_insert_with(|| param.value());
        }

        Self {
            plugin_name: PLUGIN_NAME.to_string(),
            plugin_version: PLUGIN_VERSION.to_string(),
            parameters,
            presets: presets
                .occupied()
                .map(|(slot, preset)| PresetEntry {
                    slot,
                    name: preset.name.clone(),
                    values: preset.values.clone(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a state document
    pub fn from_json(text: &str) -> PipelineResult<Self> {
        let state: PluginState = serde_json::from_str(text)?;

        if state.plugin_name != PLUGIN_NAME {
            return Err(PipelineError::InvalidState(format!(
                "state belongs to '{}', not '{}'",
                state.plugin_name, PLUGIN_NAME
            )));
        }
        if let Some(entry) = state.presets.iter().find(|e| e.slot >= PRESET_SLOT_COUNT) {
            return Err(PipelineError::InvalidState(format!(
                "preset slot {} out of range",
                entry.slot
            )));
        }
        Ok(state)
    }

    /// Apply this state, returning how many parameters were restored
    ///
    /// Parameter values go through `ParameterRegistry::set` (clamped);
    /// names that are not registered are skipped. Listed preset slots are
    /// replaced; slots not listed are left as they are.
    pub fn apply(&self, registry: &ParameterRegistry, presets: &mut PresetStore) -> PipelineResult<usize> {
        let mut applied = 0usize;
        for (name, &value) in &self.parameters {
            match registry.id_for_name(name) {
                Some(id) => {
                    registry.set(id, value)?;
                    applied += 1;
                }
                None => log::warn!("Restored state names unknown parameter '{}', skipping", name),
            }
        }

        for entry in &self.presets {
            presets.replace(
                entry.slot,
                PresetSlot {
                    name: entry.name.clone(),
                    values: entry.values.clone(),
                },
            )?;
        }

        log::info!(
            "Restored plugin state v{} ({} parameters, {} presets)",
            self.plugin_version,
            applied,
            self.presets.len()
        );
        Ok(applied)
    }
}
