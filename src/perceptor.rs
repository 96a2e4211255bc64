//! The perceptor capability: one pluggable inference stage.
//!
//! A perceptor receives adapted input once per pulse, runs its inference, and
//! returns a JSON result that the engine publishes into the pulse's
//! [`PerceptionModel`](crate::model::PerceptionModel). Implementations should
//! be stateless across pulses where possible; anything tunable at runtime
//! belongs in the config schema rather than in fields the host mutates.
//!
//! # Error handling
//!
//! A `run` failure is routed through the pipeline's perceptor error handler
//! when one is installed (the result is simply absent for that pulse);
//! without a handler it terminates the run. `load` failures always fail
//! registration.
//!
//! # Examples
//!
//! ```
//! use async_trait::async_trait;
//! use pulseline::perceptor::{Perceptor, PerceptorError};
//! use pulseline::registry::ConfigRegistry;
//! use serde_json::{Value, json};
//!
//! struct Threshold;
//!
//! #[async_trait]
//! impl Perceptor for Threshold {
//!     fn load(&self, _accelerator: Option<usize>) -> Result<(), PerceptorError> {
//!         Ok(())
//!     }
//!
//!     async fn run(
//!         &self,
//!         input: Value,
//!         config: &ConfigRegistry,
//!     ) -> Result<Value, PerceptorError> {
//!         let cutoff = config.get_float("cutoff").unwrap_or(0.5);
//!         let score = input.as_f64().ok_or(PerceptorError::MissingInput {
//!             what: "numeric score",
//!         })?;
//!         Ok(json!(score >= cutoff))
//!     }
//! }
//! ```

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::config::{ConfigEntry, ConfigValue};
use crate::events::EventEmitter;
use crate::registry::ConfigRegistry;

#[async_trait]
pub trait Perceptor: Send + Sync {
    /// Prepare the stage for execution. Called exactly once, synchronously,
    /// when the perceptor is registered; `accelerator` is the lock index the
    /// stage was bound to, if any, so it can target the right device.
    fn load(&self, accelerator: Option<usize>) -> Result<(), PerceptorError>;

    /// Execute one inference turn against adapted input.
    ///
    /// `config` is a snapshot of the stage's settings taken at the start of
    /// the turn; mid-turn mutations land on the next pulse.
    async fn run(&self, input: Value, config: &ConfigRegistry) -> Result<Value, PerceptorError>;

    /// Settings this stage exposes to the control surface.
    fn config_schema(&self) -> Vec<ConfigEntry> {
        Vec::new()
    }

    /// Synchronous notification that a setting was accepted. The new value is
    /// already stored when this fires.
    fn on_config_set(&self, _name: &str, _value: &ConfigValue) {}

    /// Event emitter for stages that publish domain events, if any.
    fn emitter(&self) -> Option<&EventEmitter> {
        None
    }
}

/// Errors raised by perceptor implementations and the per-node turn logic.
#[derive(Debug, Error, Diagnostic)]
pub enum PerceptorError {
    /// Stage failed to initialize (model weights missing, device absent, ...).
    #[error("load failed: {message}")]
    #[diagnostic(code(pulseline::perceptor::load))]
    LoadFailed { message: String },

    /// Inference failed at run time.
    #[error("inference failed: {message}")]
    #[diagnostic(code(pulseline::perceptor::inference))]
    Inference { message: String },

    /// Adapted input lacked something the stage requires.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(pulseline::perceptor::missing_input),
        help("Check the input adapter attached to this perceptor.")
    )]
    MissingInput { what: &'static str },

    /// A per-element stage received input that is not a JSON array.
    #[error("per-element perceptor expects an array input, got {got}")]
    #[diagnostic(
        code(pulseline::perceptor::expected_array),
        help("Per-element stages run once per element; the input adapter must produce an array.")
    )]
    ExpectedArray { got: &'static str },

    /// Result could not be serialized.
    #[error(transparent)]
    #[diagnostic(code(pulseline::perceptor::serde_json))]
    Serde(#[from] serde_json::Error),
}

impl PerceptorError {
    /// Describe a JSON value's shape for error messages.
    pub(crate) fn json_shape(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}
