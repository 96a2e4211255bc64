//! The pulse loop.
//!
//! `run` plans the DAG into waves once, then drives pulses until the source
//! is exhausted, the stop token fires, or a fatal error occurs. Stopping is
//! cooperative and lands between pulses; a pulse in flight always completes.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::model::PerceptionModel;
use crate::node::PerceptorNode;
use crate::scheduler::run_wave;
use crate::sink::{SinkError, SinkSlot};
use crate::stream::StreamItem;

use super::{Pipeline, PipelineError};

/// Lifecycle of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Never run.
    Idle,
    /// Pulse loop active; structure is sealed.
    Running,
    /// A run has ended (cleanly or fatally). The pipeline may run again.
    Stopped,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Create a linked stop handle/token pair. The host wires OS signals (or any
/// other trigger) to the handle; the pipeline polls the token between pulses.
pub fn stop_channel() -> (StopHandle, StopToken) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopToken { rx })
}

/// Requests a cooperative stop. Dropping the handle without calling
/// [`stop`](StopHandle::stop) also stops the pipeline; an unstoppable run is
/// never what anyone meant.
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observed by the pulse loop between pulses and while waiting on the source.
#[derive(Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once a stop has been requested (or the handle dropped).
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Pipeline {
    /// Drive pulses until end-of-stream, a stop request, or a fatal error.
    ///
    /// Exactly one run can be active at a time. On return the source has been
    /// stopped and every sink closed, whatever the outcome.
    #[instrument(skip(self, stop), err)]
    pub async fn run(&self, mut stop: StopToken) -> Result<(), PipelineError> {
        {
            let mut state = self.inner.state.write();
            if *state == PipelineState::Running {
                return Err(PipelineError::AlreadyRunning);
            }
            *state = PipelineState::Running;
        }

        let result = self.drive(&mut stop).await;

        *self.inner.state.write() = PipelineState::Stopped;
        self.close_sinks().await;
        if let Err(err) = &result {
            warn!(error = %err, "pipeline terminated");
        } else {
            info!(pulses = self.pulse(), "pipeline stopped");
        }
        result
    }

    async fn drive(&self, stop: &mut StopToken) -> Result<(), PipelineError> {
        let mut source = self
            .inner
            .source
            .lock()
            .take()
            .ok_or(PipelineError::NoSource)?;

        let waves = self.planned_waves()?;
        info!(
            waves = waves.len(),
            perceptors = self.inner.perceptors.read().len(),
            "pulse loop starting"
        );
        // Throughput is measured per run; the pulse counter itself is
        // cumulative across runs.
        self.inner
            .pulse_base
            .store(self.inner.pulse.load(Ordering::SeqCst), Ordering::SeqCst);
        *self.inner.started_at.write() = Some(Instant::now());

        let outcome = loop {
            if stop.is_stopped() {
                break Ok(());
            }
            let fetched = tokio::select! {
                _ = stop.cancelled() => break Ok(()),
                fetched = source.next() => fetched,
            };
            match fetched {
                Ok(Some(item)) => {
                    if let Err(err) = self.pulse_once(item, &waves).await {
                        break Err(err);
                    }
                }
                Ok(None) => {
                    info!("source exhausted");
                    break Ok(());
                }
                Err(err) => {
                    let handler = self.inner.callbacks.read().source_error.clone();
                    match handler {
                        Some(handler) => {
                            warn!(error = %err, "source error absorbed by handler");
                            handler(&err);
                        }
                        None => break Err(PipelineError::Source(err)),
                    }
                }
            }
        };

        source.stop();
        *self.inner.source.lock() = Some(source);
        outcome
    }

    /// Layer the current graph into waves of node handles.
    fn planned_waves(&self) -> Result<Vec<Vec<Arc<PerceptorNode>>>, PipelineError> {
        let order = self.inner.order.read().clone();
        let layered = crate::graph::plan_waves(&order, &self.children_map())?;
        let map = self.inner.perceptors.read();
        Ok(layered
            .into_iter()
            .map(|wave| {
                wave.iter()
                    .filter_map(|name| map.get(name).cloned())
                    .collect()
            })
            .collect())
    }

    async fn pulse_once(
        &self,
        item: StreamItem,
        waves: &[Vec<Arc<PerceptorNode>>],
    ) -> Result<(), PipelineError> {
        let pulse_started = Instant::now();
        let pulse = self.inner.pulse.fetch_add(1, Ordering::SeqCst) + 1;
        let item = Arc::new(item);
        self.inner.input_history.write().push(pulse, item.clone());
        debug!(pulse, "pulse starting");

        let mut working: FxHashMap<String, Value> = FxHashMap::default();
        let mut turn_durations: FxHashMap<String, Duration> = FxHashMap::default();
        let pps_so_far = self.pps();

        for wave in waves {
            // Each wave sees results from strictly earlier waves.
            let snapshot = Arc::new(PerceptionModel::new(
                pulse,
                item.clone(),
                pps_so_far,
                working.clone(),
            ));
            let outcome = run_wave(
                wave.clone(),
                item.clone(),
                snapshot,
                self.inner.accelerators.clone(),
                self.inner.workers.clone(),
            )
            .await;

            for (name, err) in outcome.failures {
                let handler = self.inner.callbacks.read().perceptor_error.clone();
                match handler {
                    Some(handler) => {
                        warn!(perceptor = %name, error = %err, "perceptor error absorbed by handler");
                        handler(&name, &err);
                    }
                    None => return Err(PipelineError::Perceptor { name, source: err }),
                }
            }
            for (name, value, duration) in outcome.results {
                turn_durations.insert(name.clone(), duration);
                working.insert(name, value);
            }
        }

        let model = Arc::new(PerceptionModel::new(pulse, item.clone(), self.pps(), working));
        self.inner.model_history.write().push(pulse, model.clone());
        if let Some(callback) = self.inner.callbacks.read().on_perception.clone() {
            callback(&model);
        }

        self.dispatch_sinks(&model, &item).await?;

        let metrics = self
            .inner
            .tracker
            .write()
            .record(pulse, pulse_started.elapsed(), &turn_durations);
        self.inner.metrics_history.write().push(pulse, metrics);
        if let Some(callback) = self.inner.callbacks.read().on_pulse.clone() {
            callback(&model);
        }
        debug!(pulse, pps = model.pps(), "pulse complete");
        Ok(())
    }

    /// Deliver the frozen model to every sink concurrently, recording return
    /// values in the model's post-processing slot.
    async fn dispatch_sinks(
        &self,
        model: &Arc<PerceptionModel>,
        item: &Arc<StreamItem>,
    ) -> Result<(), PipelineError> {
        let slots: Vec<Arc<SinkSlot>> = {
            let order = self.inner.sink_order.read();
            let map = self.inner.sinks.read();
            order.iter().filter_map(|n| map.get(n).cloned()).collect()
        };
        if slots.is_empty() {
            return Ok(());
        }

        let mut tasks: JoinSet<(String, Result<Value, SinkError>)> = JoinSet::new();
        for slot in slots {
            let model = model.clone();
            let item = item.clone();
            let workers = self.inner.workers.clone();
            tasks.spawn(async move {
                // Sink writes share the worker pool with perceptor turns.
                // The semaphore is never closed while the pipeline runs.
                let permit = workers.acquire_owned().await.ok();
                let payload = match &slot.adapter {
                    Some(adapter) => adapter(&model, &item),
                    None => model.to_value(),
                };
                let written = slot.sink.write(payload).await;
                drop(permit);
                (slot.name.clone(), written)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (name, written) = match joined {
                Ok(pair) => pair,
                Err(join_err) => (
                    String::new(),
                    Err(SinkError::Write {
                        message: format!("sink task aborted: {join_err}"),
                    }),
                ),
            };
            match written {
                Ok(value) => model.record_sink_result(&name, value),
                Err(err) => {
                    let handler = self.inner.callbacks.read().sink_error.clone();
                    match handler {
                        Some(handler) => {
                            warn!(sink = %name, error = %err, "sink error absorbed by handler");
                            handler(&name, &err);
                        }
                        None => return Err(PipelineError::Sink { name, source: err }),
                    }
                }
            }
        }
        Ok(())
    }

    async fn close_sinks(&self) {
        let slots: Vec<Arc<SinkSlot>> = self.inner.sinks.read().values().cloned().collect();
        for slot in slots {
            slot.sink.close().await;
        }
    }
}
