//! Registration-time wrapper around a perceptor.
//!
//! A [`PerceptorBinding`] is what the host hands to the pipeline: the stage
//! itself plus its placement knobs (accelerator affinity, per-element
//! multiplicity, adapters, initial config overrides). Registration turns it
//! into a [`PerceptorNode`], the engine's long-lived record for the stage.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::config::{ConfigError, ConfigValue};
use crate::model::PerceptionModel;
use crate::perceptor::Perceptor;
use crate::registry::ConfigRegistry;
use crate::stream::StreamItem;

/// Shapes the raw stream item (plus earlier-wave results) into this stage's
/// input. The default adapter passes the raw item data through unchanged.
pub type InputAdapter =
    Arc<dyn Fn(&StreamItem, &PerceptionModel, &ConfigRegistry) -> Value + Send + Sync>;

/// Reshapes the stage's result before it is published into the model.
pub type OutputAdapter = Arc<dyn Fn(Value, &PerceptionModel) -> Value + Send + Sync>;

/// A perceptor plus its placement options, ready for registration.
pub struct PerceptorBinding {
    pub(crate) perceptor: Arc<dyn Perceptor>,
    pub(crate) accelerator: Option<usize>,
    pub(crate) per_element: bool,
    pub(crate) input_adapter: Option<InputAdapter>,
    pub(crate) output_adapter: Option<OutputAdapter>,
    pub(crate) config_overrides: Vec<(String, ConfigValue)>,
}

impl PerceptorBinding {
    pub fn new(perceptor: impl Perceptor + 'static) -> Self {
        Self::from_arc(Arc::new(perceptor))
    }

    pub fn from_arc(perceptor: Arc<dyn Perceptor>) -> Self {
        Self {
            perceptor,
            accelerator: None,
            per_element: false,
            input_adapter: None,
            output_adapter: None,
            config_overrides: Vec::new(),
        }
    }

    /// Bind the stage to an accelerator lock index. Stages sharing an index
    /// never run their modules concurrently.
    #[must_use]
    pub fn with_accelerator(mut self, index: usize) -> Self {
        self.accelerator = Some(index);
        self
    }

    /// Run the module once per element of its (array) input, publishing the
    /// collected results as an array.
    #[must_use]
    pub fn per_element(mut self) -> Self {
        self.per_element = true;
        self
    }

    #[must_use]
    pub fn with_input_adapter<F>(mut self, adapter: F) -> Self
    where
        F: Fn(&StreamItem, &PerceptionModel, &ConfigRegistry) -> Value + Send + Sync + 'static,
    {
        self.input_adapter = Some(Arc::new(adapter));
        self
    }

    #[must_use]
    pub fn with_output_adapter<F>(mut self, adapter: F) -> Self
    where
        F: Fn(Value, &PerceptionModel) -> Value + Send + Sync + 'static,
    {
        self.output_adapter = Some(Arc::new(adapter));
        self
    }

    /// Override a schema default at registration. Applied (and validated)
    /// before the stage is loaded; an invalid override fails registration.
    #[must_use]
    pub fn with_config(mut self, name: impl Into<String>, value: ConfigValue) -> Self {
        self.config_overrides.push((name.into(), value));
        self
    }
}

/// Engine-side record for one registered perceptor.
pub(crate) struct PerceptorNode {
    pub(crate) name: String,
    pub(crate) perceptor: Arc<dyn Perceptor>,
    pub(crate) accelerator: Option<usize>,
    pub(crate) per_element: bool,
    pub(crate) children: RwLock<Vec<String>>,
    pub(crate) registry: RwLock<ConfigRegistry>,
    pub(crate) input_adapter: Option<InputAdapter>,
    pub(crate) output_adapter: Option<OutputAdapter>,
}

impl PerceptorNode {
    /// Build the node record: seed the registry from the stage's schema and
    /// apply (validated) overrides, notifying the stage for each.
    pub(crate) fn build(name: &str, binding: PerceptorBinding) -> Result<Self, ConfigError> {
        let mut registry = ConfigRegistry::new(binding.perceptor.config_schema());
        for (setting, value) in binding.config_overrides {
            let accepted = registry.set(&setting, value)?;
            binding.perceptor.on_config_set(&setting, &accepted);
        }
        Ok(Self {
            name: name.to_string(),
            perceptor: binding.perceptor,
            accelerator: binding.accelerator,
            per_element: binding.per_element,
            children: RwLock::new(Vec::new()),
            registry: RwLock::new(registry),
            input_adapter: binding.input_adapter,
            output_adapter: binding.output_adapter,
        })
    }

    pub(crate) fn children(&self) -> Vec<String> {
        self.children.read().clone()
    }

    pub(crate) fn add_child(&self, child: &str) {
        let mut guard = self.children.write();
        if !guard.iter().any(|c| c == child) {
            guard.push(child.to_string());
        }
    }

    pub(crate) fn remove_child(&self, child: &str) {
        self.children.write().retain(|c| c != child);
    }

    /// Snapshot of this stage's settings for one turn.
    pub(crate) fn config_snapshot(&self) -> ConfigRegistry {
        self.registry.read().clone()
    }
}
