//! Accelerator arbitration: module invocations sharing a lock index must
//! serialize; distinct or absent indices run concurrently within a wave.

use std::time::Duration;

use pulseline::node::PerceptorBinding;
use pulseline::pipeline::{Pipeline, PipelineConfig, stop_channel};
use pulseline::utils::testing::{SleepyPerceptor, VecSource, intervals_overlap, interval_log};
use serde_json::json;

const NAP: Duration = Duration::from_millis(80);

async fn run_once(pipeline: &Pipeline) {
    let (_handle, token) = stop_channel();
    pipeline.run(token).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn same_index_serializes_module_invocations() {
    let log = interval_log();
    let pipeline = Pipeline::new(PipelineConfig::default().with_accelerators(1));
    pipeline.update_source(VecSource::new(vec![json!(0)])).unwrap();
    // Both roots: same wave, same lock.
    pipeline
        .add_perceptor(
            "first",
            None,
            PerceptorBinding::new(SleepyPerceptor::new("first", NAP, log.clone()))
                .with_accelerator(0),
        )
        .unwrap();
    pipeline
        .add_perceptor(
            "second",
            None,
            PerceptorBinding::new(SleepyPerceptor::new("second", NAP, log.clone()))
                .with_accelerator(0),
        )
        .unwrap();

    run_once(&pipeline).await;

    assert!(
        !intervals_overlap(&log, "first", "second"),
        "stages sharing an accelerator must not overlap"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn distinct_indices_run_concurrently() {
    let log = interval_log();
    let pipeline = Pipeline::new(PipelineConfig::default().with_accelerators(2));
    pipeline.update_source(VecSource::new(vec![json!(0)])).unwrap();
    pipeline
        .add_perceptor(
            "tpu0",
            None,
            PerceptorBinding::new(SleepyPerceptor::new("tpu0", NAP, log.clone()))
                .with_accelerator(0),
        )
        .unwrap();
    pipeline
        .add_perceptor(
            "tpu1",
            None,
            PerceptorBinding::new(SleepyPerceptor::new("tpu1", NAP, log.clone()))
                .with_accelerator(1),
        )
        .unwrap();

    run_once(&pipeline).await;

    assert!(
        intervals_overlap(&log, "tpu0", "tpu1"),
        "stages on distinct accelerators should run concurrently"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unbound_stages_ignore_the_pool_entirely() {
    let log = interval_log();
    let pipeline = Pipeline::new(PipelineConfig::default().with_accelerators(1));
    pipeline.update_source(VecSource::new(vec![json!(0)])).unwrap();
    pipeline
        .add_perceptor(
            "locked",
            None,
            PerceptorBinding::new(SleepyPerceptor::new("locked", NAP, log.clone()))
                .with_accelerator(0),
        )
        .unwrap();
    pipeline
        .add_perceptor(
            "free",
            None,
            PerceptorBinding::new(SleepyPerceptor::new("free", NAP, log.clone())),
        )
        .unwrap();

    run_once(&pipeline).await;

    assert!(
        intervals_overlap(&log, "locked", "free"),
        "an unbound stage should not wait on any accelerator lock"
    );
}
