//! Wave execution.
//!
//! One wave is a set of perceptors whose dependencies are all satisfied; the
//! scheduler runs them concurrently under the pipeline's worker-pool
//! semaphore and joins them at a barrier before the next wave starts. Each
//! node's turn is: snapshot its config, adapt input, take its accelerator
//! lock (if bound), invoke the module, release, adapt output.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::accelerator::AcceleratorPool;
use crate::model::PerceptionModel;
use crate::node::PerceptorNode;
use crate::perceptor::PerceptorError;
use crate::stream::StreamItem;

/// Results of one wave, failures kept separate so the driver can apply the
/// handler-or-fatal policy.
pub(crate) struct WaveOutcome {
    pub(crate) results: Vec<(String, Value, Duration)>,
    pub(crate) failures: Vec<(String, PerceptorError)>,
}

pub(crate) async fn run_wave(
    wave: Vec<Arc<PerceptorNode>>,
    item: Arc<StreamItem>,
    model: Arc<PerceptionModel>,
    accelerators: Arc<AcceleratorPool>,
    workers: Arc<Semaphore>,
) -> WaveOutcome {
    let mut tasks: JoinSet<(String, Result<(Value, Duration), PerceptorError>)> = JoinSet::new();

    for node in wave {
        let item = item.clone();
        let model = model.clone();
        let accelerators = accelerators.clone();
        let workers = workers.clone();
        tasks.spawn(async move {
            // The semaphore is never closed while waves run.
            let permit = workers.acquire_owned().await.ok();
            let result = run_turn(&node, &item, &model, &accelerators).await;
            drop(permit);
            (node.name.clone(), result)
        });
    }

    let mut outcome = WaveOutcome {
        results: Vec::new(),
        failures: Vec::new(),
    };
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Ok((value, duration)))) => {
                debug!(perceptor = %name, ?duration, "perceptor turn complete");
                outcome.results.push((name, value, duration));
            }
            Ok((name, Err(err))) => outcome.failures.push((name, err)),
            Err(join_err) => outcome.failures.push((
                String::new(),
                PerceptorError::Inference {
                    message: format!("perceptor task aborted: {join_err}"),
                },
            )),
        }
    }
    outcome
}

async fn run_turn(
    node: &PerceptorNode,
    item: &StreamItem,
    model: &PerceptionModel,
    accelerators: &AcceleratorPool,
) -> Result<(Value, Duration), PerceptorError> {
    let started = Instant::now();
    let config = node.config_snapshot();

    let input = match &node.input_adapter {
        Some(adapter) => adapter(item, model, &config),
        None => item.data.clone(),
    };

    let raw = {
        // Lock spans the module invocation only; adaptation runs unlocked.
        let _guard = match node.accelerator {
            Some(index) => Some(accelerators.acquire(index).await),
            None => None,
        };
        if node.per_element {
            run_per_element(node, input, &config).await?
        } else {
            node.perceptor.run(input, &config).await?
        }
    };

    let output = match &node.output_adapter {
        Some(adapter) => adapter(raw, model),
        None => raw,
    };
    Ok((output, started.elapsed()))
}

/// Invoke the module once per element of an array input, preserving order.
/// Any element failure fails the whole turn; partial results are discarded.
pub(crate) async fn run_per_element(
    node: &PerceptorNode,
    input: Value,
    config: &crate::registry::ConfigRegistry,
) -> Result<Value, PerceptorError> {
    let Value::Array(elements) = input else {
        return Err(PerceptorError::ExpectedArray {
            got: PerceptorError::json_shape(&input),
        });
    };
    let mut collected = Vec::with_capacity(elements.len());
    for element in elements {
        collected.push(node.perceptor.run(element, config).await?);
    }
    Ok(Value::Array(collected))
}
