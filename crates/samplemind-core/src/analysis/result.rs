//! Analysis results and the store that publishes them
//!
//! Exactly one "current" result exists. The worker replaces it wholesale
//! after each successful analysis; readers get either the whole previous
//! result or the whole new one, never a mix.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::{EngineError, EngineResult};
use crate::sync::lock;

/// Response fields holding plain numbers
const NUMBER_FIELDS: [&str; 4] = ["tempo_bpm", "energy_level", "confidence_score", "duration_seconds"];

/// Response fields holding labels
const TEXT_FIELDS: [&str; 3] = ["key", "primary_genre", "mood"];

/// Nested object of additional named features
const EXTENDED_FIELD: &str = "extended_features";

/// Musical features extracted from one block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub tempo_bpm: f32,
    pub key: String,
    pub primary_genre: String,
    pub mood: String,
    pub energy_level: f32,
    pub confidence_score: f32,
    pub duration_seconds: f32,
    /// Any additional numeric features the engine reported
    pub extended_features: BTreeMap<String, f32>,
}

impl AnalysisResult {
    /// Build a result from an engine's JSON answer
    ///
    /// Known fields must have the right JSON type when present (`null` counts
    /// as absent). Every other numeric field, plus the members of a nested
    /// `extended_features` object, becomes an extended feature. An answer
    /// that is not an object, or that carries none of the core fields, is
    /// malformed.
    pub fn from_engine_response(response: &Value) -> EngineResult<Self> {
        let object = response
            .as_object()
            .ok_or_else(|| EngineError::Malformed(format!("expected an object, got {}", kind_of(response))))?;

        let mut result = AnalysisResult::default();
        let mut core_fields = 0usize;

        for (name, value) in object {
            if value.is_null() {
                continue;
            }
            match name.as_str() {
                "tempo_bpm" | "energy_level" | "confidence_score" | "duration_seconds" => {
                    let number = number_field(name, value)?;
                    match name.as_str() {
                        "tempo_bpm" => result.tempo_bpm = number,
                        "energy_level" => result.energy_level = number,
                        "confidence_score" => result.confidence_score = number,
                        _ => result.duration_seconds = number,
                    }
                    if name != "duration_seconds" {
                        core_fields += 1;
                    }
                }
                "key" | "primary_genre" | "mood" => {
                    let text = text_field(name, value)?;
                    match name.as_str() {
                        "key" => result.key = text,
                        "primary_genre" => result.primary_genre = text,
                        _ => result.mood = text,
                    }
                    core_fields += 1;
                }
                EXTENDED_FIELD => {
                    let nested = value.as_object().ok_or_else(|| {
                        EngineError::Malformed(format!("'{}' must be an object", EXTENDED_FIELD))
                    })?;
                    collect_numbers(nested, &mut result.extended_features);
                }
                _ => {
                    if let Some(number) = value.as_f64() {
                        result.extended_features.insert(name.clone(), number as f32);
                    }
                }
            }
        }

        if core_fields == 0 {
            return Err(EngineError::Malformed(format!(
                "none of the analysis fields present (expected some of {:?} / {:?})",
                NUMBER_FIELDS, TEXT_FIELDS
            )));
        }

        Ok(result)
    }

    /// True for the zeroed value held before any analysis completes
    pub fn is_empty(&self) -> bool {
        *self == AnalysisResult::default()
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analysis Results:")?;
        writeln!(f, "  BPM: {:.1}", self.tempo_bpm)?;
        writeln!(f, "  Key: {}", self.key)?;
        writeln!(f, "  Genre: {}", self.primary_genre)?;
        writeln!(f, "  Mood: {}", self.mood)?;
        writeln!(f, "  Energy: {:.2}", self.energy_level)?;
        writeln!(f, "  Confidence: {:.2}", self.confidence_score)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn number_field(name: &str, value: &Value) -> EngineResult<f32> {
    value
        .as_f64()
        .map(|n| n as f32)
        .ok_or_else(|| EngineError::Malformed(format!("'{}' must be a number, got {}", name, kind_of(value))))
}

fn text_field(name: &str, value: &Value) -> EngineResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| EngineError::Malformed(format!("'{}' must be a string, got {}", name, kind_of(value))))
}

fn collect_numbers(object: &Map<String, Value>, into: &mut BTreeMap<String, f32>) {
    for (name, value) in object {
        if let Some(number) = value.as_f64() {
            into.insert(name.clone(), number as f32);
        }
    }
}

/// Holder of the latest published analysis
///
/// The lock guards only an `Arc` swap or clone, so neither the worker nor a
/// reader ever holds it for longer than a pointer copy.
///
/// Every [`clear`](Self::clear) starts a new epoch. The worker reads the
/// epoch before taking a block and publishes with
/// [`publish_if`](Self::publish_if), so a result for audio taken before a
/// clear never replaces the cleared value.
#[derive(Debug, Default)]
pub struct AnalysisResultStore {
    current: Mutex<Current>,
    generation: AtomicU64,
}

#[derive(Debug, Default)]
struct Current {
    result: Arc<AnalysisResult>,
    epoch: u64,
}

impl AnalysisResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current epoch; changes only on `clear`
    pub fn epoch(&self) -> u64 {
        lock(&self.current).epoch
    }

    /// Replace the current result if no clear happened since `epoch` was read
    ///
    /// Returns `false` (and drops `result`) if the store moved on.
    pub fn publish_if(&self, epoch: u64, result: AnalysisResult) -> bool {
        let result = Arc::new(result);
        let previous = {
            let mut current = lock(&self.current);
            if current.epoch != epoch {
                return false;
            }
            let previous = std::mem::replace(&mut current.result, result);
            self.generation.fetch_add(1, Ordering::Release);
            previous
        };
        drop(previous);
        true
    }

    /// Copy of the current result
    pub fn read(&self) -> AnalysisResult {
        self.snapshot().as_ref().clone()
    }

    /// Shared handle to the current result without copying its contents
    pub fn snapshot(&self) -> Arc<AnalysisResult> {
        Arc::clone(&lock(&self.current).result)
    }

    /// Reset to the zeroed result and start a new epoch
    pub fn clear(&self) {
        let previous = {
            let mut current = lock(&self.current);
            current.epoch += 1;
            self.generation.fetch_add(1, Ordering::Release);
            std::mem::take(&mut current.result)
        };
        drop(previous);
    }

    /// Incremented on every publish or clear; lets the UI poll for changes
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
