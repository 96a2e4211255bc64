//! # Pulseline: pulse-driven perception pipeline engine
//!
//! Pulseline drives a DAG of pluggable inference stages ("perceptors") in
//! repeated *pulses*: fetch one item from the input source, run the DAG in
//! concurrent waves, freeze the results into a per-pulse perception model,
//! fan the model out to output sinks, and record bounded history and timing
//! metrics along the way.
//!
//! ## Core concepts
//!
//! - **Perceptor**: an async inference stage with a config schema and an
//!   optional accelerator binding ([`perceptor`])
//! - **Waves**: dependency layers of the DAG; nodes inside a wave run
//!   concurrently, waves run strictly in order ([`graph`])
//! - **Perception model**: the frozen per-pulse result map ([`model`])
//! - **Source / Sink**: the input stream and the output fan-out ([`stream`],
//!   [`sink`])
//! - **Control plane**: live, validated config mutation and introspection
//!   ([`control`], and an axum adapter in [`rest`] behind the `rest-api`
//!   feature)
//!
//! ## Quick start
//!
//! ```no_run
//! use pulseline::node::PerceptorBinding;
//! use pulseline::pipeline::{Pipeline, PipelineConfig, stop_channel};
//! use pulseline::sink::SinkBinding;
//! use pulseline::utils::testing::{CollectingSink, MapPerceptor, VecSource};
//! use serde_json::json;
//!
//! # async fn demo() -> miette::Result<()> {
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! pipeline.update_source(VecSource::new(vec![json!(1), json!(2)]))?;
//! pipeline.add_perceptor(
//!     "increment",
//!     None,
//!     PerceptorBinding::new(MapPerceptor::new(|v| {
//!         json!(v.as_i64().unwrap_or(0) + 1)
//!     })),
//! )?;
//! pipeline.add_output_sink("console", SinkBinding::new(CollectingSink::new()))?;
//!
//! let (_handle, token) = stop_channel();
//! pipeline.run(token).await?;
//! assert_eq!(pipeline.pulse(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error policy
//!
//! Structural mistakes (duplicate names, cycles, bad accelerator indexes)
//! fail loudly at registration. At run time, perceptor, sink, and source
//! failures are local when the corresponding error handler is installed and
//! fatal otherwise. Config validation failures are always local: an invalid
//! set is rejected and the prior value stands.
//!
//! ## Module guide
//!
//! - [`pipeline`] - registration, the pulse loop, and lifecycle control
//! - [`perceptor`] / [`node`] - the stage capability and its binding options
//! - [`graph`] - wave layering and structural validation
//! - [`accelerator`] - mutual exclusion for shared inference hardware
//! - [`config`] / [`registry`] - typed settings with live validated mutation
//! - [`model`] / [`history`] / [`metrics`] - per-pulse results and retention
//! - [`stream`] / [`sink`] - input and output capabilities
//! - [`events`] - per-stage domain event emission
//! - [`control`] - transport-free remote-control surface

pub mod accelerator;
pub mod config;
pub mod control;
pub mod events;
pub mod graph;
pub mod history;
pub mod metrics;
pub mod model;
pub mod node;
pub mod perceptor;
pub mod pipeline;
pub mod registry;
#[cfg(feature = "rest-api")]
pub mod rest;
mod scheduler;
pub mod sink;
pub mod stream;
pub mod telemetry;
pub mod utils;
