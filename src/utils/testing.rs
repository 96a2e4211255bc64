//! Instrumented fakes for exercising pipelines in tests and examples.
//!
//! Everything here is deterministic and records what happened to it, so
//! tests can assert on load calls, run timing, stop idempotence, and
//! delivered payloads without real devices or streams.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::config::{ConfigEntry, ConfigValue};
use crate::perceptor::{Perceptor, PerceptorError};
use crate::registry::ConfigRegistry;
use crate::sink::{Sink, SinkError};
use crate::stream::{Source, SourceError, StreamItem};

// ============================================================================
// Perceptors
// ============================================================================

/// Applies a pure function to its input. Records load calls and the
/// accelerator index it was bound to.
pub struct MapPerceptor {
    f: Arc<dyn Fn(Value) -> Value + Send + Sync>,
    loads: AtomicUsize,
    bound_accelerator: Mutex<Option<Option<usize>>>,
}

impl MapPerceptor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(f),
            loads: AtomicUsize::new(0),
            bound_accelerator: Mutex::new(None),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn bound_accelerator(&self) -> Option<Option<usize>> {
        *self.bound_accelerator.lock()
    }
}

#[async_trait]
impl Perceptor for MapPerceptor {
    fn load(&self, accelerator: Option<usize>) -> Result<(), PerceptorError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        *self.bound_accelerator.lock() = Some(accelerator);
        Ok(())
    }

    async fn run(&self, input: Value, _config: &ConfigRegistry) -> Result<Value, PerceptorError> {
        Ok((self.f)(input))
    }
}

/// Interval log shared by [`SleepyPerceptor`] instances, for asserting which
/// module invocations overlapped in time.
pub type IntervalLog = Arc<Mutex<Vec<(String, Instant, Instant)>>>;

pub fn interval_log() -> IntervalLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// True when the two named intervals overlap.
pub fn intervals_overlap(log: &IntervalLog, a: &str, b: &str) -> bool {
    let guard = log.lock();
    let find = |label: &str| {
        guard
            .iter()
            .find(|(name, _, _)| name == label)
            .map(|(_, start, end)| (*start, *end))
    };
    match (find(a), find(b)) {
        (Some((a_start, a_end)), Some((b_start, b_end))) => a_start < b_end && b_start < a_end,
        _ => false,
    }
}

/// Sleeps for a fixed duration inside `run`, logging its interval. The sleep
/// happens inside the module invocation, so accelerator locks cover it.
pub struct SleepyPerceptor {
    label: String,
    delay: Duration,
    log: IntervalLog,
}

impl SleepyPerceptor {
    pub fn new(label: impl Into<String>, delay: Duration, log: IntervalLog) -> Self {
        Self {
            label: label.into(),
            delay,
            log,
        }
    }
}

#[async_trait]
impl Perceptor for SleepyPerceptor {
    fn load(&self, _accelerator: Option<usize>) -> Result<(), PerceptorError> {
        Ok(())
    }

    async fn run(&self, _input: Value, _config: &ConfigRegistry) -> Result<Value, PerceptorError> {
        let start = Instant::now();
        tokio::time::sleep(self.delay).await;
        self.log.lock().push((self.label.clone(), start, Instant::now()));
        Ok(json!(self.label))
    }
}

/// Fails every run with an inference error.
pub struct FailingPerceptor {
    message: String,
}

impl FailingPerceptor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Perceptor for FailingPerceptor {
    fn load(&self, _accelerator: Option<usize>) -> Result<(), PerceptorError> {
        Ok(())
    }

    async fn run(&self, _input: Value, _config: &ConfigRegistry) -> Result<Value, PerceptorError> {
        Err(PerceptorError::Inference {
            message: self.message.clone(),
        })
    }
}

/// Exposes a config schema and records every accepted setting notification.
pub struct ConfigurablePerceptor {
    schema: Vec<ConfigEntry>,
    pub notifications: Mutex<Vec<(String, ConfigValue)>>,
}

impl ConfigurablePerceptor {
    pub fn new(schema: Vec<ConfigEntry>) -> Self {
        Self {
            schema,
            notifications: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Perceptor for ConfigurablePerceptor {
    fn load(&self, _accelerator: Option<usize>) -> Result<(), PerceptorError> {
        Ok(())
    }

    async fn run(&self, _input: Value, config: &ConfigRegistry) -> Result<Value, PerceptorError> {
        // Echo the current settings so tests can see the snapshot it ran with.
        let settings: serde_json::Map<String, Value> = config
            .entries()
            .map(|(value, entry)| (entry.name.clone(), value.to_json()))
            .collect();
        Ok(Value::Object(settings))
    }

    fn config_schema(&self) -> Vec<ConfigEntry> {
        self.schema.clone()
    }

    fn on_config_set(&self, name: &str, value: &ConfigValue) {
        self.notifications.lock().push((name.to_string(), value.clone()));
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Yields a fixed sequence of payloads, then ends the stream.
pub struct VecSource {
    items: VecDeque<Value>,
    stops: Arc<AtomicUsize>,
}

impl VecSource {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: items.into(),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared stop counter, for asserting idempotent shutdown.
    pub fn stop_counter(&self) -> Arc<AtomicUsize> {
        self.stops.clone()
    }
}

#[async_trait]
impl Source for VecSource {
    async fn next(&mut self) -> Result<Option<StreamItem>, SourceError> {
        Ok(self.items.pop_front().map(StreamItem::new))
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Alternates good items with errors (`ok[0], Err, ok[1], Err, ...`) and
/// ends the stream once the good items run out.
pub struct FlakySource {
    items: VecDeque<Value>,
    yield_error_next: bool,
}

impl FlakySource {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: items.into(),
            yield_error_next: false,
        }
    }
}

#[async_trait]
impl Source for FlakySource {
    async fn next(&mut self) -> Result<Option<StreamItem>, SourceError> {
        if self.yield_error_next {
            self.yield_error_next = false;
            return Err(SourceError::Acquisition {
                message: "flaky read".to_string(),
            });
        }
        self.yield_error_next = true;
        match self.items.pop_front() {
            Some(value) => Ok(Some(StreamItem::new(value))),
            None => Ok(None),
        }
    }

    fn stop(&mut self) {}
}

// ============================================================================
// Sinks
// ============================================================================

/// Records every payload it receives and returns a delivery receipt.
#[derive(Default)]
pub struct CollectingSink {
    payloads: Arc<Mutex<Vec<Value>>>,
    closes: Arc<AtomicUsize>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Arc<Mutex<Vec<Value>>> {
        self.payloads.clone()
    }

    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }
}

#[async_trait]
impl Sink for CollectingSink {
    async fn write(&self, payload: Value) -> Result<Value, SinkError> {
        let mut guard = self.payloads.lock();
        guard.push(payload);
        Ok(json!({ "delivered": guard.len() }))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sleeps for a fixed duration inside `write`, logging its interval. Pairs
/// with [`intervals_overlap`] to assert which sink writes ran concurrently.
pub struct SleepySink {
    label: String,
    delay: Duration,
    log: IntervalLog,
}

impl SleepySink {
    pub fn new(label: impl Into<String>, delay: Duration, log: IntervalLog) -> Self {
        Self {
            label: label.into(),
            delay,
            log,
        }
    }
}

#[async_trait]
impl Sink for SleepySink {
    async fn write(&self, _payload: Value) -> Result<Value, SinkError> {
        let start = Instant::now();
        tokio::time::sleep(self.delay).await;
        self.log.lock().push((self.label.clone(), start, Instant::now()));
        Ok(json!(self.label))
    }
}

/// Fails every write.
pub struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    async fn write(&self, _payload: Value) -> Result<Value, SinkError> {
        Err(SinkError::Write {
            message: "refused".to_string(),
        })
    }
}
