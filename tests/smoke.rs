//! Whole-engine smoke test: a diamond DAG with adapters, events, a sink, and
//! wave-order assertions in one run.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulseline::events::EventEmitter;
use pulseline::node::PerceptorBinding;
use pulseline::perceptor::{Perceptor, PerceptorError};
use pulseline::pipeline::{Pipeline, PipelineConfig, stop_channel};
use pulseline::registry::ConfigRegistry;
use pulseline::sink::SinkBinding;
use pulseline::utils::testing::{CollectingSink, VecSource};
use serde_json::{Value, json};

/// Logs its turn and emits an event for every run.
struct TracingPerceptor {
    label: String,
    order: Arc<Mutex<Vec<String>>>,
    emitter: EventEmitter,
}

impl TracingPerceptor {
    fn new(label: &str, order: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label: label.to_string(),
            order,
            emitter: EventEmitter::new(["ran"]),
        }
    }
}

#[async_trait]
impl Perceptor for TracingPerceptor {
    fn load(&self, _accelerator: Option<usize>) -> Result<(), PerceptorError> {
        Ok(())
    }

    async fn run(&self, input: Value, _config: &ConfigRegistry) -> Result<Value, PerceptorError> {
        self.order.lock().push(self.label.clone());
        self.emitter
            .emit("ran", &json!({ "stage": self.label }))
            .map_err(|_| PerceptorError::Inference {
                message: "event emission failed".to_string(),
            })?;
        Ok(json!({ "stage": self.label, "saw": input }))
    }

    fn emitter(&self) -> Option<&EventEmitter> {
        Some(&self.emitter)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn diamond_graph_runs_waves_in_dependency_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::new(Mutex::new(Vec::new()));

    let pipeline = Pipeline::new(PipelineConfig::default().with_worker_limit(4));
    pipeline
        .update_source(VecSource::new(vec![json!("frame-1"), json!("frame-2")]))
        .unwrap();

    let root = Arc::new(TracingPerceptor::new("root", order.clone()));
    {
        let events = events.clone();
        root.emitter()
            .unwrap()
            .on(
                "ran",
                Arc::new(move |payload| {
                    events.lock().push(payload.clone());
                }),
            )
            .unwrap();
    }
    pipeline
        .add_perceptor("root", None, PerceptorBinding::from_arc(root))
        .unwrap();
    pipeline
        .add_perceptor(
            "left",
            Some("root"),
            PerceptorBinding::new(TracingPerceptor::new("left", order.clone())),
        )
        .unwrap();
    pipeline
        .add_parallel_perceptor(
            "left",
            "right",
            PerceptorBinding::new(TracingPerceptor::new("right", order.clone())),
        )
        .unwrap();
    pipeline
        .add_perceptor(
            "join",
            Some("left"),
            PerceptorBinding::new(TracingPerceptor::new("join", order.clone()))
                .with_input_adapter(|_item, model, _config| {
                    json!({
                        "left": model.value("left").cloned(),
                        "right": model.value("right").cloned(),
                    })
                }),
        )
        .unwrap();

    let sink = CollectingSink::new();
    let payloads = sink.payloads();
    pipeline.add_output_sink("out", SinkBinding::new(sink)).unwrap();

    let (_handle, token) = stop_channel();
    pipeline.run(token).await.unwrap();

    // Two pulses, four turns each.
    let order = order.lock();
    assert_eq!(order.len(), 8);
    for pulse in order.chunks(4) {
        assert_eq!(pulse[0], "root");
        assert_eq!(pulse[3], "join");
        assert!(pulse[1..3].contains(&"left".to_string()));
        assert!(pulse[1..3].contains(&"right".to_string()));
    }

    // The join stage saw both middle results through its adapter.
    let model = pipeline.model_at(2).unwrap();
    let join = model.value("join").unwrap();
    assert_eq!(join["saw"]["left"]["stage"], json!("left"));
    assert_eq!(join["saw"]["right"]["stage"], json!("right"));

    // Root's event fired once per pulse.
    assert_eq!(events.lock().len(), 2);

    // The sink saw both pulses.
    assert_eq!(payloads.lock().len(), 2);
}
