//! The pipeline: registration, structure mutation, introspection.
//!
//! A [`Pipeline`] owns the perceptor DAG, the accelerator pool, the attached
//! source and output sinks, the history ledgers, and the error/callback
//! policy. Registration is only allowed while the pipeline is not running;
//! the pulse loop itself lives in [`driver`].
//!
//! # Examples
//!
//! ```no_run
//! use pulseline::pipeline::{Pipeline, PipelineConfig, stop_channel};
//! use pulseline::node::PerceptorBinding;
//! use pulseline::utils::testing::{MapPerceptor, VecSource};
//! use serde_json::json;
//!
//! # async fn demo() -> miette::Result<()> {
//! let pipeline = Pipeline::new(PipelineConfig::default().with_accelerators(2));
//! pipeline.update_source(VecSource::new(vec![json!(1), json!(2)]))?;
//! pipeline.add_perceptor(
//!     "detect",
//!     None,
//!     PerceptorBinding::new(MapPerceptor::new(|v| v)).with_accelerator(0),
//! )?;
//! pipeline.add_perceptor_after("detect", "classify",
//!     PerceptorBinding::new(MapPerceptor::new(|v| v)))?;
//!
//! let (_handle, token) = stop_channel();
//! pipeline.run(token).await?;
//! # Ok(())
//! # }
//! ```

pub mod driver;

pub use driver::{PipelineState, StopHandle, StopToken, stop_channel};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use miette::Diagnostic;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

use crate::accelerator::AcceleratorPool;
use crate::control::ControlPlane;
use crate::graph::{self, GraphError};
use crate::history::HistoryLedger;
use crate::metrics::{MetricsSummary, MetricsTracker, PulseMetrics};
use crate::model::PerceptionModel;
use crate::node::{PerceptorBinding, PerceptorNode};
use crate::perceptor::PerceptorError;
use crate::sink::{SinkBinding, SinkError, SinkSlot};
use crate::stream::{Source, SourceError, StreamItem};

// ============================================================================
// Configuration and callbacks
// ============================================================================

/// Engine-level knobs fixed at construction.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Number of accelerator lock slots (minimum 1).
    pub accelerator_count: usize,
    /// Maximum perceptor turns in flight at once.
    pub worker_limit: usize,
    pub input_history_len: usize,
    pub model_history_len: usize,
    pub metrics_history_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            accelerator_count: 1,
            worker_limit: 10,
            input_history_len: 50,
            model_history_len: 50,
            metrics_history_len: 50,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn with_accelerators(mut self, count: usize) -> Self {
        self.accelerator_count = count.max(1);
        self
    }

    #[must_use]
    pub fn with_worker_limit(mut self, limit: usize) -> Self {
        self.worker_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_input_history(mut self, len: usize) -> Self {
        self.input_history_len = len;
        self
    }

    #[must_use]
    pub fn with_model_history(mut self, len: usize) -> Self {
        self.model_history_len = len;
        self
    }

    #[must_use]
    pub fn with_metrics_history(mut self, len: usize) -> Self {
        self.metrics_history_len = len;
        self
    }
}

/// Handler making perceptor failures local: `(perceptor name, error)`.
pub type PerceptorErrorHandler = Arc<dyn Fn(&str, &PerceptorError) + Send + Sync>;
/// Handler making sink failures local: `(sink name, error)`.
pub type SinkErrorHandler = Arc<dyn Fn(&str, &SinkError) + Send + Sync>;
/// Handler making source failures local.
pub type SourceErrorHandler = Arc<dyn Fn(&SourceError) + Send + Sync>;
/// Callback receiving the frozen model of a pulse.
pub type ModelCallback = Arc<dyn Fn(&Arc<PerceptionModel>) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Callbacks {
    pub(crate) perceptor_error: Option<PerceptorErrorHandler>,
    pub(crate) sink_error: Option<SinkErrorHandler>,
    pub(crate) source_error: Option<SourceErrorHandler>,
    pub(crate) on_perception: Option<ModelCallback>,
    pub(crate) on_pulse: Option<ModelCallback>,
}

// ============================================================================
// Pipeline
// ============================================================================

pub(crate) struct PipelineInner {
    pub(crate) config: PipelineConfig,
    pub(crate) perceptors: RwLock<FxHashMap<String, Arc<PerceptorNode>>>,
    pub(crate) order: RwLock<Vec<String>>,
    pub(crate) sinks: RwLock<FxHashMap<String, Arc<SinkSlot>>>,
    pub(crate) sink_order: RwLock<Vec<String>>,
    pub(crate) accelerators: Arc<AcceleratorPool>,
    pub(crate) workers: Arc<Semaphore>,
    pub(crate) state: RwLock<PipelineState>,
    pub(crate) source: Mutex<Option<Box<dyn Source>>>,
    pub(crate) input_history: RwLock<HistoryLedger<Arc<StreamItem>>>,
    pub(crate) model_history: RwLock<HistoryLedger<Arc<PerceptionModel>>>,
    pub(crate) metrics_history: RwLock<HistoryLedger<PulseMetrics>>,
    pub(crate) tracker: RwLock<MetricsTracker>,
    pub(crate) pulse: AtomicU64,
    /// Value of `pulse` when the current run started; throughput counts only
    /// pulses beyond it.
    pub(crate) pulse_base: AtomicU64,
    pub(crate) started_at: RwLock<Option<Instant>>,
    pub(crate) callbacks: RwLock<Callbacks>,
}

pub struct Pipeline {
    pub(crate) inner: Arc<PipelineInner>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let inner = PipelineInner {
            accelerators: Arc::new(AcceleratorPool::new(config.accelerator_count)),
            workers: Arc::new(Semaphore::new(config.worker_limit.max(1))),
            perceptors: RwLock::new(FxHashMap::default()),
            order: RwLock::new(Vec::new()),
            sinks: RwLock::new(FxHashMap::default()),
            sink_order: RwLock::new(Vec::new()),
            state: RwLock::new(PipelineState::Idle),
            source: Mutex::new(None),
            input_history: RwLock::new(HistoryLedger::new(config.input_history_len)),
            model_history: RwLock::new(HistoryLedger::new(config.model_history_len)),
            metrics_history: RwLock::new(HistoryLedger::new(config.metrics_history_len)),
            tracker: RwLock::new(MetricsTracker::default()),
            pulse: AtomicU64::new(0),
            pulse_base: AtomicU64::new(0),
            started_at: RwLock::new(None),
            callbacks: RwLock::new(Callbacks::default()),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Handle for remote/config control; cheap to clone and hand out.
    #[must_use]
    pub fn control(&self) -> ControlPlane {
        ControlPlane::new(self.inner.clone())
    }

    // ==== callback wiring ====================================================

    /// Make perceptor failures local: the failing stage's result is simply
    /// absent for the pulse and the handler is told about it.
    pub fn set_perceptor_error_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &PerceptorError) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().perceptor_error = Some(Arc::new(handler));
    }

    pub fn set_sink_error_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &SinkError) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().sink_error = Some(Arc::new(handler));
    }

    pub fn set_source_error_handler<F>(&self, handler: F)
    where
        F: Fn(&SourceError) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().source_error = Some(Arc::new(handler));
    }

    /// Invoked with the frozen model after every pulse's waves complete,
    /// before sinks run.
    pub fn on_perception_complete<F>(&self, callback: F)
    where
        F: Fn(&Arc<PerceptionModel>) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().on_perception = Some(Arc::new(callback));
    }

    /// Invoked after sinks and metrics for every pulse.
    pub fn on_pulse_complete<F>(&self, callback: F)
    where
        F: Fn(&Arc<PerceptionModel>) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().on_pulse = Some(Arc::new(callback));
    }

    // ==== structure mutation =================================================

    /// Attach or replace the input source. Rejected while running.
    pub fn update_source(&self, source: impl Source + 'static) -> Result<(), GraphError> {
        self.ensure_not_running("update the source")?;
        *self.inner.source.lock() = Some(Box::new(source));
        Ok(())
    }

    /// Register a perceptor, optionally as a child of `parent`.
    #[instrument(skip(self, binding), err)]
    pub fn add_perceptor(
        &self,
        name: &str,
        parent: Option<&str>,
        binding: PerceptorBinding,
    ) -> Result<(), GraphError> {
        self.ensure_not_running("register a perceptor")?;
        if let Some(parent) = parent {
            self.require_perceptor(parent)?;
        }
        let node = self.admit(name, binding)?;
        if let Some(parent) = parent
            && let Some(parent_node) = self.inner.perceptors.read().get(parent)
        {
            parent_node.add_child(name);
        }
        self.commit(name, node);
        Ok(())
    }

    /// Register a perceptor downstream of `target`. Identical to
    /// [`add_perceptor`](Self::add_perceptor) with a parent.
    pub fn add_perceptor_after(
        &self,
        target: &str,
        name: &str,
        binding: PerceptorBinding,
    ) -> Result<(), GraphError> {
        self.add_perceptor(name, Some(target), binding)
    }

    /// Splice a perceptor in front of `target`: every former parent of
    /// `target` now parents the new node, and the new node parents `target`.
    #[instrument(skip(self, binding), err)]
    pub fn add_perceptor_before(
        &self,
        target: &str,
        name: &str,
        binding: PerceptorBinding,
    ) -> Result<(), GraphError> {
        self.ensure_not_running("register a perceptor")?;
        self.require_perceptor(target)?;
        let node = self.admit(name, binding)?;

        let parents = graph::parents_of(target, &self.children_map());
        {
            let map = self.inner.perceptors.read();
            for parent in &parents {
                if let Some(parent_node) = map.get(parent) {
                    parent_node.remove_child(target);
                    parent_node.add_child(name);
                }
            }
        }
        node.add_child(target);
        self.commit(name, node);
        Ok(())
    }

    /// Register a perceptor alongside `sibling`: it inherits every current
    /// parent of `sibling` but gains no edge to the sibling itself.
    #[instrument(skip(self, binding), err)]
    pub fn add_parallel_perceptor(
        &self,
        sibling: &str,
        name: &str,
        binding: PerceptorBinding,
    ) -> Result<(), GraphError> {
        self.ensure_not_running("register a perceptor")?;
        self.require_perceptor(sibling)?;
        let node = self.admit(name, binding)?;

        let parents = graph::parents_of(sibling, &self.children_map());
        {
            let map = self.inner.perceptors.read();
            for parent in &parents {
                if let Some(parent_node) = map.get(parent) {
                    parent_node.add_child(name);
                }
            }
        }
        self.commit(name, node);
        Ok(())
    }

    /// Register an output sink.
    #[instrument(skip(self, binding), err)]
    pub fn add_output_sink(&self, name: &str, binding: SinkBinding) -> Result<(), GraphError> {
        self.ensure_not_running("register an output sink")?;
        self.require_free_name(name)?;
        let slot = Arc::new(SinkSlot::build(name, binding)?);
        self.inner.sinks.write().insert(name.to_string(), slot);
        self.inner.sink_order.write().push(name.to_string());
        info!(sink = %name, "output sink registered");
        Ok(())
    }

    /// Remove a previously registered output sink.
    pub fn remove_output_sink(&self, name: &str) -> Result<(), GraphError> {
        self.ensure_not_running("remove an output sink")?;
        if self.inner.sinks.write().remove(name).is_none() {
            return Err(GraphError::UnknownSink {
                name: name.to_string(),
            });
        }
        self.inner.sink_order.write().retain(|n| n != name);
        Ok(())
    }

    // ==== ad-hoc execution ===================================================

    /// Run a perceptor once, outside the pulse loop, without registering it.
    ///
    /// The binding is validated and loaded like a registration (config
    /// overrides applied, accelerator index checked and its lock honored),
    /// but the graph is untouched and no pulse is recorded. Input and output
    /// adapters are ignored since there is no pulse context for them.
    pub async fn run_perceptor(
        &self,
        binding: PerceptorBinding,
        input: Value,
    ) -> Result<Value, PipelineError> {
        if let Some(index) = binding.accelerator
            && !self.inner.accelerators.contains(index)
        {
            return Err(GraphError::AcceleratorOutOfRange {
                index,
                count: self.inner.accelerators.count(),
            }
            .into());
        }
        let node = PerceptorNode::build("ad-hoc", binding).map_err(GraphError::from)?;
        node.perceptor
            .load(node.accelerator)
            .map_err(|source| GraphError::Load {
                name: node.name.clone(),
                source,
            })?;

        let config = node.config_snapshot();
        let result = {
            let _guard = match node.accelerator {
                Some(index) => Some(self.inner.accelerators.acquire(index).await),
                None => None,
            };
            if node.per_element {
                crate::scheduler::run_per_element(&node, input, &config).await
            } else {
                node.perceptor.run(input, &config).await
            }
        };
        result.map_err(|source| PipelineError::Perceptor {
            name: node.name.clone(),
            source,
        })
    }

    // ==== registration internals =============================================

    fn ensure_not_running(&self, operation: &'static str) -> Result<(), GraphError> {
        if *self.inner.state.read() == PipelineState::Running {
            return Err(GraphError::PipelineRunning { operation });
        }
        Ok(())
    }

    fn require_perceptor(&self, name: &str) -> Result<(), GraphError> {
        if !self.inner.perceptors.read().contains_key(name) {
            return Err(GraphError::UnknownPerceptor {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn require_free_name(&self, name: &str) -> Result<(), GraphError> {
        if self.inner.perceptors.read().contains_key(name)
            || self.inner.sinks.read().contains_key(name)
        {
            return Err(GraphError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Validate a binding and load its module; nothing is published yet.
    fn admit(&self, name: &str, binding: PerceptorBinding) -> Result<Arc<PerceptorNode>, GraphError> {
        self.require_free_name(name)?;
        if let Some(index) = binding.accelerator
            && !self.inner.accelerators.contains(index)
        {
            return Err(GraphError::AcceleratorOutOfRange {
                index,
                count: self.inner.accelerators.count(),
            });
        }
        let node = PerceptorNode::build(name, binding)?;
        node.perceptor
            .load(node.accelerator)
            .map_err(|source| GraphError::Load {
                name: name.to_string(),
                source,
            })?;
        Ok(Arc::new(node))
    }

    fn commit(&self, name: &str, node: Arc<PerceptorNode>) {
        self.inner
            .perceptors
            .write()
            .insert(name.to_string(), node);
        self.inner.order.write().push(name.to_string());
        info!(perceptor = %name, "perceptor registered");
    }

    pub(crate) fn children_map(&self) -> FxHashMap<String, Vec<String>> {
        self.inner
            .perceptors
            .read()
            .iter()
            .map(|(name, node)| (name.clone(), node.children()))
            .collect()
    }

    // ==== introspection ======================================================

    pub fn state(&self) -> PipelineState {
        *self.inner.state.read()
    }

    /// The knobs this pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Total completed (or in-flight) pulses, cumulative across runs.
    pub fn pulse(&self) -> u64 {
        self.inner.pulse.load(Ordering::SeqCst)
    }

    /// Throughput in pulses per second over the current run.
    pub fn pps(&self) -> f64 {
        let started = self.inner.started_at.read();
        match *started {
            Some(at) => {
                let elapsed = at.elapsed().as_secs_f64();
                let done = self
                    .pulse()
                    .saturating_sub(self.inner.pulse_base.load(Ordering::SeqCst));
                if elapsed > 0.0 {
                    done as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    /// Dependency graph as a name-to-children map.
    pub fn graph(&self) -> FxHashMap<String, Vec<String>> {
        self.children_map()
    }

    pub fn perceptor_names(&self) -> Vec<String> {
        self.inner.order.read().clone()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.inner.sink_order.read().clone()
    }

    pub fn latest_input(&self) -> Option<Arc<StreamItem>> {
        self.inner.input_history.read().latest().cloned()
    }

    pub fn input_at(&self, pulse: u64) -> Option<Arc<StreamItem>> {
        self.inner.input_history.read().get(pulse).cloned()
    }

    pub fn input_history(&self) -> FxHashMap<u64, Arc<StreamItem>> {
        self.inner.input_history.read().to_map()
    }

    pub fn latest_model(&self) -> Option<Arc<PerceptionModel>> {
        self.inner.model_history.read().latest().cloned()
    }

    pub fn model_at(&self, pulse: u64) -> Option<Arc<PerceptionModel>> {
        self.inner.model_history.read().get(pulse).cloned()
    }

    pub fn model_history(&self) -> FxHashMap<u64, Arc<PerceptionModel>> {
        self.inner.model_history.read().to_map()
    }

    pub fn metrics_at(&self, pulse: u64) -> Option<PulseMetrics> {
        self.inner.metrics_history.read().get(pulse).cloned()
    }

    pub fn metrics_history(&self) -> FxHashMap<u64, PulseMetrics> {
        self.inner.metrics_history.read().to_map()
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.inner.tracker.read().summary()
    }
}

// ============================================================================
// Fatal run errors
// ============================================================================

/// Errors that terminate (or prevent) a run.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("pipeline is already running")]
    #[diagnostic(code(pulseline::pipeline::already_running))]
    AlreadyRunning,

    #[error("no input source attached")]
    #[diagnostic(
        code(pulseline::pipeline::no_source),
        help("Attach a source with update_source before calling run.")
    )]
    NoSource,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    /// A perceptor failed and no perceptor error handler was installed.
    #[error("perceptor {name} failed")]
    #[diagnostic(code(pulseline::pipeline::perceptor))]
    Perceptor {
        name: String,
        #[source]
        source: PerceptorError,
    },

    /// A sink failed and no sink error handler was installed.
    #[error("output sink {name} failed")]
    #[diagnostic(code(pulseline::pipeline::sink))]
    Sink {
        name: String,
        #[source]
        source: SinkError,
    },

    /// The source failed and no source error handler was installed.
    #[error("input source failed")]
    #[diagnostic(code(pulseline::pipeline::source))]
    Source(#[from] SourceError),
}
