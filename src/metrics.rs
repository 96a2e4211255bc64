//! Pulse timing metrics.
//!
//! Every pulse records its wall-clock duration and the per-perceptor turn
//! durations, alongside cumulative averages over the whole run. The averages
//! use the running-mean update `avg = (avg * (n - 1) + t) / n`, so they never
//! need the full history.

use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::Serialize;

/// Timing for one perceptor within one pulse.
#[derive(Clone, Debug, Serialize)]
pub struct PerceptorMetrics {
    /// Turn duration this pulse, in seconds.
    pub duration: f64,
    /// Cumulative average turn duration, in seconds.
    pub avg_duration: f64,
}

/// Timing record for one pulse, stored in the metrics ledger.
#[derive(Clone, Debug, Serialize)]
pub struct PulseMetrics {
    pub pulse: u64,
    /// Whole-pulse duration in seconds, input fetch excluded.
    pub duration: f64,
    /// Cumulative average pulse duration in seconds.
    pub avg_duration: f64,
    pub perceptors: FxHashMap<String, PerceptorMetrics>,
}

/// Run-wide summary surfaced by introspection.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsSummary {
    pub pulses: u64,
    pub avg_pulse_duration: f64,
    /// Cumulative average turn duration per perceptor, in seconds.
    pub perceptors: FxHashMap<String, f64>,
}

/// Accumulates cumulative means across pulses.
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pulses: u64,
    avg_pulse: f64,
    // name -> (samples, cumulative average)
    per_node: FxHashMap<String, (u64, f64)>,
}

impl MetricsTracker {
    /// Fold one pulse in and produce its ledger record.
    pub(crate) fn record(
        &mut self,
        pulse: u64,
        pulse_duration: Duration,
        node_durations: &FxHashMap<String, Duration>,
    ) -> PulseMetrics {
        self.pulses += 1;
        let n = self.pulses as f64;
        let t = pulse_duration.as_secs_f64();
        self.avg_pulse = (self.avg_pulse * (n - 1.0) + t) / n;

        let mut perceptors = FxHashMap::default();
        for (name, duration) in node_durations {
            let t = duration.as_secs_f64();
            let (samples, avg) = self.per_node.entry(name.clone()).or_insert((0, 0.0));
            *samples += 1;
            let s = *samples as f64;
            *avg = (*avg * (s - 1.0) + t) / s;
            perceptors.insert(
                name.clone(),
                PerceptorMetrics {
                    duration: t,
                    avg_duration: *avg,
                },
            );
        }

        PulseMetrics {
            pulse,
            duration: t,
            avg_duration: self.avg_pulse,
            perceptors,
        }
    }

    pub(crate) fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            pulses: self.pulses,
            avg_pulse_duration: self.avg_pulse,
            perceptors: self
                .per_node
                .iter()
                .map(|(name, (_, avg))| (name.clone(), *avg))
                .collect(),
        }
    }
}
