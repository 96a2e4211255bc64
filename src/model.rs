//! The per-pulse perception model.
//!
//! Each pulse produces exactly one [`PerceptionModel`]: a map from perceptor
//! name to that perceptor's (adapted) result, plus the pulse number, a
//! reference to the raw input item, and the throughput measured when the
//! pulse completed. While waves execute, the driver owns a working copy and
//! hands each wave an immutable snapshot, so an input adapter can only ever
//! observe results from strictly earlier waves. Once the last wave joins the
//! model is frozen and shared as-is with sinks, callbacks, and history.
//!
//! Sink return values land in a separate post-processing slot
//! ([`sink_results`](PerceptionModel::sink_results)); they are visible to
//! history readers and introspection but never to other sinks.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::stream::StreamItem;

pub struct PerceptionModel {
    pulse: u64,
    input: Arc<StreamItem>,
    pps: f64,
    values: FxHashMap<String, Value>,
    sink_results: RwLock<FxHashMap<String, Value>>,
}

impl PerceptionModel {
    pub(crate) fn new(
        pulse: u64,
        input: Arc<StreamItem>,
        pps: f64,
        values: FxHashMap<String, Value>,
    ) -> Self {
        Self {
            pulse,
            input,
            pps,
            values,
            sink_results: RwLock::new(FxHashMap::default()),
        }
    }

    /// Pulse number this model belongs to (first pulse is 1).
    pub fn pulse(&self) -> u64 {
        self.pulse
    }

    /// The raw input item this pulse ran against.
    pub fn input(&self) -> &Arc<StreamItem> {
        &self.input
    }

    /// Pulses per second measured over the whole run so far.
    pub fn pps(&self) -> f64 {
        self.pps
    }

    /// Result published by a named perceptor, if it completed this pulse.
    ///
    /// A perceptor whose failure was absorbed by an error handler has no
    /// entry for that pulse.
    pub fn value(&self, perceptor: &str) -> Option<&Value> {
        self.values.get(perceptor)
    }

    /// All perceptor results for this pulse.
    pub fn values(&self) -> &FxHashMap<String, Value> {
        &self.values
    }

    pub(crate) fn record_sink_result(&self, sink: &str, value: Value) {
        self.sink_results.write().insert(sink.to_string(), value);
    }

    /// Values returned by output sinks after the model was frozen.
    pub fn sink_results(&self) -> FxHashMap<String, Value> {
        self.sink_results.read().clone()
    }

    /// JSON rendering used as the default sink payload.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "pulse": self.pulse,
            "pps": self.pps,
            "timestamp": self.input.timestamp.to_rfc3339(),
            "perceptors": Value::Object(
                self.values
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        })
    }
}

impl std::fmt::Debug for PerceptionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerceptionModel")
            .field("pulse", &self.pulse)
            .field("pps", &self.pps)
            .field("perceptors", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}
