//! Output-sink capability.
//!
//! After a pulse's model is frozen, every registered sink receives a payload
//! (by default the model's JSON rendering, or whatever the binding's adapter
//! produces) and writes it wherever it writes: an annotated frame, a REST
//! push, a log file. Sinks run concurrently with each other and return a
//! value that lands in the model's post-processing slot.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

use crate::config::{ConfigEntry, ConfigError, ConfigValue};
use crate::model::PerceptionModel;
use crate::registry::ConfigRegistry;
use crate::stream::StreamItem;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one pulse's payload. The returned value is recorded in the
    /// model's sink-results slot.
    async fn write(&self, payload: Value) -> Result<Value, SinkError>;

    /// Release resources. Called once when the pipeline stops.
    async fn close(&self) {}

    /// Settings this sink exposes to the control surface.
    fn config_schema(&self) -> Vec<ConfigEntry> {
        Vec::new()
    }

    /// Synchronous notification that a setting was accepted.
    fn on_config_set(&self, _name: &str, _value: &ConfigValue) {}
}

/// Builds the sink payload from the frozen model and the raw input item.
pub type SinkAdapter = Arc<dyn Fn(&PerceptionModel, &StreamItem) -> Value + Send + Sync>;

/// A sink plus its payload adapter and config overrides, ready to register.
pub struct SinkBinding {
    pub(crate) sink: Arc<dyn Sink>,
    pub(crate) adapter: Option<SinkAdapter>,
    pub(crate) config_overrides: Vec<(String, ConfigValue)>,
}

impl SinkBinding {
    pub fn new(sink: impl Sink + 'static) -> Self {
        Self::from_arc(Arc::new(sink))
    }

    pub fn from_arc(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            adapter: None,
            config_overrides: Vec::new(),
        }
    }

    /// Shape the payload instead of sending the default model rendering.
    #[must_use]
    pub fn with_adapter<F>(mut self, adapter: F) -> Self
    where
        F: Fn(&PerceptionModel, &StreamItem) -> Value + Send + Sync + 'static,
    {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    /// Override a schema default at registration.
    #[must_use]
    pub fn with_config(mut self, name: impl Into<String>, value: ConfigValue) -> Self {
        self.config_overrides.push((name.into(), value));
        self
    }
}

/// Engine-side record for one registered sink.
pub(crate) struct SinkSlot {
    pub(crate) name: String,
    pub(crate) sink: Arc<dyn Sink>,
    pub(crate) adapter: Option<SinkAdapter>,
    pub(crate) registry: RwLock<ConfigRegistry>,
}

impl SinkSlot {
    pub(crate) fn build(name: &str, binding: SinkBinding) -> Result<Self, ConfigError> {
        let mut registry = ConfigRegistry::new(binding.sink.config_schema());
        for (setting, value) in binding.config_overrides {
            let accepted = registry.set(&setting, value)?;
            binding.sink.on_config_set(&setting, &accepted);
        }
        Ok(Self {
            name: name.to_string(),
            sink: binding.sink,
            adapter: binding.adapter,
            registry: RwLock::new(registry),
        })
    }
}

/// Errors raised while delivering output.
#[derive(Debug, Error, Diagnostic)]
pub enum SinkError {
    /// The underlying transport or device rejected the write.
    #[error("sink write failed: {message}")]
    #[diagnostic(code(pulseline::sink::write))]
    Write { message: String },

    /// The sink was written to after being closed.
    #[error("sink already closed")]
    #[diagnostic(code(pulseline::sink::closed))]
    Closed,

    /// Payload could not be serialized for delivery.
    #[error(transparent)]
    #[diagnostic(code(pulseline::sink::serde_json))]
    Serde(#[from] serde_json::Error),
}
