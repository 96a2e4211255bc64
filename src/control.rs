//! Transport-free control surface.
//!
//! A [`ControlPlane`] is a cheap handle over a pipeline's shared interior
//! that exposes the remote-control operations: list stages, read config
//! reports, and patch settings. Patches are applied entry by entry — valid
//! entries in a batch take effect even when others fail, and the failures
//! come back in the [`PatchOutcome`]. The REST layer (feature `rest-api`)
//! is a thin adapter over this type.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::pipeline::PipelineInner;
use crate::registry::ConfigReport;

#[derive(Clone)]
pub struct ControlPlane {
    inner: Arc<PipelineInner>,
}

/// Result of a config patch: which settings were applied, and what failed.
/// Failures are always local; applied entries stay applied.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PatchOutcome {
    pub applied: Vec<String>,
    pub errors: Vec<PatchError>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PatchError {
    pub setting: String,
    pub message: String,
}

impl ControlPlane {
    pub(crate) fn new(inner: Arc<PipelineInner>) -> Self {
        Self { inner }
    }

    pub fn perceptor_names(&self) -> Vec<String> {
        self.inner.order.read().clone()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.inner.sink_order.read().clone()
    }

    /// Dependency graph as a name-to-children map.
    pub fn graph(&self) -> FxHashMap<String, Vec<String>> {
        self.inner
            .perceptors
            .read()
            .iter()
            .map(|(name, node)| (name.clone(), node.children()))
            .collect()
    }

    // ==== perceptor config ===================================================

    pub fn perceptor_config(&self, name: &str) -> Result<Vec<ConfigReport>, ControlError> {
        let map = self.inner.perceptors.read();
        let node = map.get(name).ok_or_else(|| ControlError::UnknownPerceptor {
            name: name.to_string(),
        })?;
        Ok(node.registry.read().reports())
    }

    pub fn all_perceptor_configs(&self) -> FxHashMap<String, Vec<ConfigReport>> {
        self.inner
            .perceptors
            .read()
            .iter()
            .map(|(name, node)| (name.clone(), node.registry.read().reports()))
            .collect()
    }

    /// Apply a batch of settings to one perceptor. Each entry is validated
    /// independently; the stage is notified synchronously for every accepted
    /// value.
    pub fn patch_perceptor_config(
        &self,
        name: &str,
        patch: &FxHashMap<String, Value>,
    ) -> Result<PatchOutcome, ControlError> {
        let node = {
            let map = self.inner.perceptors.read();
            map.get(name)
                .cloned()
                .ok_or_else(|| ControlError::UnknownPerceptor {
                    name: name.to_string(),
                })?
        };
        let mut outcome = PatchOutcome::default();
        for (setting, raw) in patch {
            let applied = node.registry.write().set_json(setting, raw);
            match applied {
                Ok(accepted) => {
                    node.perceptor.on_config_set(setting, &accepted);
                    outcome.applied.push(setting.clone());
                }
                Err(err) => outcome.errors.push(PatchError {
                    setting: setting.clone(),
                    message: err.to_string(),
                }),
            }
        }
        Ok(outcome)
    }

    /// Apply per-perceptor batches keyed by stage name. Unknown names are
    /// reported like any other entry failure rather than aborting the batch.
    pub fn patch_all_perceptor_configs(
        &self,
        patches: &FxHashMap<String, FxHashMap<String, Value>>,
    ) -> FxHashMap<String, PatchOutcome> {
        patches
            .iter()
            .map(|(name, patch)| {
                let outcome = self.patch_perceptor_config(name, patch).unwrap_or_else(|err| {
                    PatchOutcome {
                        applied: Vec::new(),
                        errors: vec![PatchError {
                            setting: name.clone(),
                            message: err.to_string(),
                        }],
                    }
                });
                (name.clone(), outcome)
            })
            .collect()
    }

    // ==== sink config ========================================================

    pub fn sink_config(&self, name: &str) -> Result<Vec<ConfigReport>, ControlError> {
        let map = self.inner.sinks.read();
        let slot = map.get(name).ok_or_else(|| ControlError::UnknownSink {
            name: name.to_string(),
        })?;
        Ok(slot.registry.read().reports())
    }

    pub fn all_sink_configs(&self) -> FxHashMap<String, Vec<ConfigReport>> {
        self.inner
            .sinks
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.registry.read().reports()))
            .collect()
    }

    pub fn patch_sink_config(
        &self,
        name: &str,
        patch: &FxHashMap<String, Value>,
    ) -> Result<PatchOutcome, ControlError> {
        let slot = {
            let map = self.inner.sinks.read();
            map.get(name).cloned().ok_or_else(|| ControlError::UnknownSink {
                name: name.to_string(),
            })?
        };
        let mut outcome = PatchOutcome::default();
        for (setting, raw) in patch {
            let applied = slot.registry.write().set_json(setting, raw);
            match applied {
                Ok(accepted) => {
                    slot.sink.on_config_set(setting, &accepted);
                    outcome.applied.push(setting.clone());
                }
                Err(err) => outcome.errors.push(PatchError {
                    setting: setting.clone(),
                    message: err.to_string(),
                }),
            }
        }
        Ok(outcome)
    }

    pub fn patch_all_sink_configs(
        &self,
        patches: &FxHashMap<String, FxHashMap<String, Value>>,
    ) -> FxHashMap<String, PatchOutcome> {
        patches
            .iter()
            .map(|(name, patch)| {
                let outcome = self.patch_sink_config(name, patch).unwrap_or_else(|err| {
                    PatchOutcome {
                        applied: Vec::new(),
                        errors: vec![PatchError {
                            setting: name.clone(),
                            message: err.to_string(),
                        }],
                    }
                });
                (name.clone(), outcome)
            })
            .collect()
    }
}

/// Lookup failures on the control surface.
#[derive(Debug, Error, Diagnostic)]
pub enum ControlError {
    #[error("unknown perceptor: {name}")]
    #[diagnostic(code(pulseline::control::unknown_perceptor))]
    UnknownPerceptor { name: String },

    #[error("unknown output sink: {name}")]
    #[diagnostic(code(pulseline::control::unknown_sink))]
    UnknownSink { name: String },
}
