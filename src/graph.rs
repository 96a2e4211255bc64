//! Dependency layering for the perceptor DAG.
//!
//! The pipeline's graph is a map from perceptor name to child names. Before a
//! run starts it is layered into *waves*: wave 0 holds every node whose
//! dependencies are already satisfied (roots and orphans), and each later
//! wave holds the nodes whose parents have all been placed in earlier waves.
//! Nodes inside one wave run concurrently; waves run strictly in order.
//!
//! Layering is deterministic: within a wave, nodes keep their registration
//! order. A cycle leaves nodes that can never be placed and is reported as a
//! fatal [`GraphError::CycleDetected`].

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::config::ConfigError;
use crate::perceptor::PerceptorError;

/// Layer a DAG into execution waves.
///
/// `order` is every node name in registration order; `children_of` maps each
/// name to its direct children. Every name appearing as a child must also
/// appear in `order`.
pub fn plan_waves(
    order: &[String],
    children_of: &FxHashMap<String, Vec<String>>,
) -> Result<Vec<Vec<String>>, GraphError> {
    let mut parent_count: FxHashMap<&str, usize> =
        order.iter().map(|n| (n.as_str(), 0)).collect();
    for children in children_of.values() {
        for child in children {
            match parent_count.get_mut(child.as_str()) {
                Some(count) => *count += 1,
                None => {
                    return Err(GraphError::UnknownPerceptor {
                        name: child.clone(),
                    });
                }
            }
        }
    }

    let mut waves: Vec<Vec<String>> = Vec::new();
    let mut placed: FxHashSet<&str> = FxHashSet::default();

    while placed.len() < order.len() {
        let wave: Vec<&str> = order
            .iter()
            .map(String::as_str)
            .filter(|name| !placed.contains(name) && parent_count[name] == 0)
            .collect();

        if wave.is_empty() {
            let mut remaining: Vec<String> = order
                .iter()
                .filter(|name| !placed.contains(name.as_str()))
                .cloned()
                .collect();
            remaining.sort();
            return Err(GraphError::CycleDetected { members: remaining });
        }

        for name in &wave {
            placed.insert(name);
            if let Some(children) = children_of.get(*name) {
                for child in children {
                    if let Some(count) = parent_count.get_mut(child.as_str()) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }
        waves.push(wave.into_iter().map(str::to_string).collect());
    }

    Ok(waves)
}

/// Direct parents of `target` in a children map.
pub(crate) fn parents_of(
    target: &str,
    children_of: &FxHashMap<String, Vec<String>>,
) -> Vec<String> {
    children_of
        .iter()
        .filter(|(_, children)| children.iter().any(|c| c == target))
        .map(|(parent, _)| parent.clone())
        .collect()
}

/// Structural errors raised at registration time. These are always fatal to
/// the operation: the graph is left exactly as it was before the call.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    /// Perceptor and sink names share one namespace; this one is taken.
    #[error("name already registered: {name}")]
    #[diagnostic(
        code(pulseline::graph::duplicate_name),
        help("Perceptors and output sinks share a single namespace.")
    )]
    DuplicateName { name: String },

    /// Referenced perceptor does not exist.
    #[error("unknown perceptor: {name}")]
    #[diagnostic(code(pulseline::graph::unknown_perceptor))]
    UnknownPerceptor { name: String },

    /// Referenced output sink does not exist.
    #[error("unknown output sink: {name}")]
    #[diagnostic(code(pulseline::graph::unknown_sink))]
    UnknownSink { name: String },

    /// Dependency edges form a cycle; the listed nodes can never be scheduled.
    #[error("dependency cycle involving: {}", members.join(", "))]
    #[diagnostic(
        code(pulseline::graph::cycle),
        help("Perceptor dependencies must form a DAG.")
    )]
    CycleDetected { members: Vec<String> },

    /// Accelerator index is outside the configured pool.
    #[error("accelerator index {index} out of range (pool holds {count})")]
    #[diagnostic(code(pulseline::graph::accelerator_range))]
    AcceleratorOutOfRange { index: usize, count: usize },

    /// Structure cannot change while the pulse loop is active.
    #[error("cannot {operation} while the pipeline is running")]
    #[diagnostic(
        code(pulseline::graph::pipeline_running),
        help("Stop the pipeline before mutating its structure or source.")
    )]
    PipelineRunning { operation: &'static str },

    /// An initial config override was invalid.
    #[error("invalid config override")]
    #[diagnostic(code(pulseline::graph::config_override))]
    Config(#[from] ConfigError),

    /// The stage's `load` hook failed.
    #[error("perceptor {name} failed to load")]
    #[diagnostic(code(pulseline::graph::load))]
    Load {
        name: String,
        #[source]
        source: PerceptorError,
    },
}
