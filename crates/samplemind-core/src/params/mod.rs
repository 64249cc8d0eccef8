//! Automatable parameter registry
//!
//! Parameters are registered during configuration (before the pipeline runs)
//! and then read once per block by the audio thread while the host or
//! automation thread writes them at arbitrary times.
//!
//! # Real-Time Safety
//!
//! Each parameter's current value lives in an [`AtomicF32`]:
//! - Read: one atomic load, no lock, no allocation
//! - Write: clamp, then one atomic store
//!
//! The parameter set itself is only mutated through `&mut self`, so once the
//! registry is shared with the audio thread its shape is frozen and lookups
//! never race with registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Numeric parameter identifier assigned by the host
pub type ParamId = u32;

/// Default printf-style display hint for parameter values
pub const DEFAULT_DISPLAY_FORMAT: &str = "%.2f";

/// Lock-free f32 cell (stored as its bit pattern in an `AtomicU32`)
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// A registered automatable parameter
///
/// Range, default and metadata are fixed at registration; only the current
/// value changes afterwards, and it always satisfies `min <= value <= max`.
#[derive(Debug)]
pub struct Parameter {
    id: ParamId,
    name: String,
    min: f32,
    max: f32,
    default: f32,
    value: AtomicF32,
    automatable: bool,
    display_format: String,
}

impl Parameter {
    /// Create a parameter with the given range and default value
    ///
    /// A reversed range is swapped and the default is clamped into range, so
    /// the value invariant holds from the start. A NaN bound collapses onto
    /// the other bound (both NaN gives `0.0..=0.0`).
    pub fn new(id: ParamId, name: impl Into<String>, min: f32, max: f32, default: f32) -> Self {
        let (min, max) = match (min.is_nan(), max.is_nan()) {
            (false, false) => (min, max),
            (true, false) => (max, max),
            (false, true) => (min, min),
            (true, true) => (0.0, 0.0),
        };
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let default = if default.is_nan() { min } else { default.clamp(min, max) };
        Self {
            id,
            name: name.into(),
            min,
            max,
            default,
            value: AtomicF32::new(default),
            automatable: true,
            display_format: DEFAULT_DISPLAY_FORMAT.to_string(),
        }
    }

    /// Set the display-format hint (e.g. "%.1f BPM")
    pub fn with_display_format(mut self, format: impl Into<String>) -> Self {
        self.display_format = format.into();
        self
    }

    /// Mark whether the host may automate this parameter
    pub fn with_automatable(mut self, automatable: bool) -> Self {
        self.automatable = automatable;
        self
    }

    #[inline]
    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn min(&self) -> f32 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> f32 {
        self.max
    }

    #[inline]
    pub fn default_value(&self) -> f32 {
        self.default
    }

    pub fn is_automatable(&self) -> bool {
        self.automatable
    }

    pub fn display_format(&self) -> &str {
        &self.display_format
    }

    /// Current value (lock-free)
    #[inline]
    pub fn value(&self) -> f32 {
        self.value.load()
    }

    /// Clamp `value` into range and store it, returning the stored value
    ///
    /// NaN is not a position in any range; it leaves the value unchanged.
    #[inline]
    pub fn set_value(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.value();
        }
        let clamped = value.clamp(self.min, self.max);
        self.value.store(clamped);
        clamped
    }

    /// Restore the registered default
    pub fn reset(&self) {
        self.value.store(self.default);
    }

    /// Owned snapshot of this parameter, including its current value
    pub fn info(&self) -> ParameterInfo {
        ParameterInfo {
            id: self.id,
            name: self.name.clone(),
            min: self.min,
            max: self.max,
            default: self.default,
            value: self.value(),
            automatable: self.automatable,
            display_format: self.display_format.clone(),
        }
    }
}

/// Snapshot of a parameter for the host/UI side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub id: ParamId,
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub value: f32,
    pub automatable: bool,
    pub display_format: String,
}

/// Owner of every registered parameter
///
/// Iteration and `list()` preserve registration order.
#[derive(Debug, Default)]
pub struct ParameterRegistry {
    params: Vec<Parameter>,
    index: HashMap<ParamId, usize>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter
    ///
    /// Fails if a parameter with the same id already exists.
    pub fn register(&mut self, param: Parameter) -> PipelineResult<()> {
        if self.index.contains_key(&param.id) {
            return Err(PipelineError::DuplicateParameter(param.id));
        }
        log::debug!(
            "Registered parameter {} '{}' [{}, {}] default {}",
            param.id,
            param.name,
            param.min,
            param.max,
            param.default
        );
        self.index.insert(param.id, self.params.len());
        self.params.push(param);
        Ok(())
    }

    /// Look up a parameter by id
    #[inline]
    pub fn parameter(&self, id: ParamId) -> Option<&Parameter> {
        self.index.get(&id).map(|&idx| &self.params[idx])
    }

    /// Set a parameter, clamping to its range; returns the stored value
    pub fn set(&self, id: ParamId, value: f32) -> PipelineResult<f32> {
        self.parameter(id)
            .map(|p| p.set_value(value))
            .ok_or(PipelineError::ParameterNotFound(id))
    }

    /// Current value of a parameter
    #[inline]
    pub fn get(&self, id: ParamId) -> PipelineResult<f32> {
        self.parameter(id)
            .map(Parameter::value)
            .ok_or(PipelineError::ParameterNotFound(id))
    }

    /// Current value, or `fallback` if the id is unknown
    ///
    /// This is the real-time read: unknown ids keep the caller's last known
    /// value instead of producing an error.
    #[inline]
    pub fn get_or(&self, id: ParamId, fallback: f32) -> f32 {
        self.parameter(id).map(Parameter::value).unwrap_or(fallback)
    }

    /// Find a parameter by exact name
    pub fn find_by_name(&self, name: &str) -> Option<ParameterInfo> {
        self.params.iter().find(|p| p.name == name).map(Parameter::info)
    }

    /// Id of the parameter with this exact name
    pub fn id_for_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().find(|p| p.name == name).map(Parameter::id)
    }

    /// Snapshots of every parameter in registration order
    pub fn list(&self) -> Vec<ParameterInfo> {
        self.params.iter().map(Parameter::info).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Restore every parameter to its registered default
    pub fn reset_to_defaults(&self) {
        for param in &self.params {
            param.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ParameterRegistry {
        let mut registry = ParameterRegistry::new();
        registry
            .register(Parameter::new(1, "Sensitivity", 0.0, 1.0, 0.5))
            .unwrap();
        registry
            .register(Parameter::new(2, "Tempo Hint", 60.0, 200.0, 120.0).with_display_format("%.1f BPM"))
            .unwrap();
        registry
            .register(Parameter::new(3, "Gain", -24.0, 12.0, 0.0).with_automatable(false))
            .unwrap();
        registry
    }

    #[test]
    fn test_set_clamps_to_range() {
        let registry = registry();
        let cases = [
            (1, -3.0, 0.0),
            (1, 0.25, 0.25),
            (1, 7.0, 1.0),
            (2, 10.0, 60.0),
            (2, 140.0, 140.0),
            (2, f32::INFINITY, 200.0),
            (3, f32::NEG_INFINITY, -24.0),
        ];
        for (id, input, expected) in cases {
            assert_eq!(registry.set(id, input).unwrap(), expected);
            assert_eq!(registry.get(id).unwrap(), expected);
        }
    }

    #[test]
    fn test_nan_leaves_value_unchanged() {
        let registry = registry();
        registry.set(1, 0.75).unwrap();
        assert_eq!(registry.set(1, f32::NAN).unwrap(), 0.75);
        assert_eq!(registry.get(1).unwrap(), 0.75);
    }

    #[test]
    fn test_unknown_id() {
        let registry = registry();
        assert_eq!(registry.set(99, 1.0), Err(PipelineError::ParameterNotFound(99)));
        assert_eq!(registry.get(99), Err(PipelineError::ParameterNotFound(99)));
        assert_eq!(registry.get_or(99, 0.3), 0.3);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry();
        let err = registry.register(Parameter::new(1, "Other", 0.0, 1.0, 0.0));
        assert_eq!(err, Err(PipelineError::DuplicateParameter(1)));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_reversed_range_and_out_of_range_default() {
        let param = Parameter::new(9, "Odd", 1.0, -1.0, 5.0);
        assert_eq!(param.min(), -1.0);
        assert_eq!(param.max(), 1.0);
        assert_eq!(param.default_value(), 1.0);
        assert_eq!(param.value(), 1.0);
    }

    #[test]
    fn test_nan_bounds_are_normalized() {
        let param = Parameter::new(1, "Lower NaN", f32::NAN, 1.0, 0.5);
        assert_eq!((param.min(), param.max()), (1.0, 1.0));
        assert_eq!(param.set_value(7.0), 1.0);

        let param = Parameter::new(2, "Upper NaN", -1.0, f32::NAN, 0.5);
        assert_eq!((param.min(), param.max()), (-1.0, -1.0));
        assert_eq!(param.value(), -1.0);

        let param = Parameter::new(3, "Both NaN", f32::NAN, f32::NAN, f32::NAN);
        assert_eq!((param.min(), param.max(), param.value()), (0.0, 0.0, 0.0));
        assert_eq!(param.set_value(-3.0), 0.0);
    }

    #[test]
    fn test_find_by_name_and_list_order() {
        let registry = registry();
        let info = registry.find_by_name("Tempo Hint").unwrap();
        assert_eq!(info.id, 2);
        assert_eq!(info.display_format, "%.1f BPM");
        assert!(registry.find_by_name("tempo hint").is_none());

        let ids: Vec<ParamId> = registry.list().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(!registry.list()[2].automatable);
    }

    #[test]
    fn test_reset_to_defaults() {
        let registry = registry();
        registry.set(1, 0.9).unwrap();
        registry.set(2, 180.0).unwrap();
        registry.reset_to_defaults();
        assert_eq!(registry.get(1).unwrap(), 0.5);
        assert_eq!(registry.get(2).unwrap(), 120.0);
    }

    #[test]
    fn test_concurrent_writes_stay_in_range() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(registry());
        let writer = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..10_000 {
                    let _ = registry.set(2, (i % 400) as f32);
                }
            })
        };
        for _ in 0..10_000 {
            let value = registry.get(2).unwrap();
            assert!((60.0..=200.0).contains(&value));
        }
        writer.join().unwrap();
    }
}
