//! Data-source capability.
//!
//! A [`Source`] hands the pipeline one [`StreamItem`] per pulse. Returning
//! `Ok(None)` signals a clean end of the sequence and stops the pipeline
//! without error; `Err` is routed through the source error handler or, absent
//! one, terminates the run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One unit of input data plus its acquisition timestamp.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamItem {
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl StreamItem {
    /// Wrap a payload, stamping it with the current time.
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_timestamp(data: Value, timestamp: DateTime<Utc>) -> Self {
        Self { data, timestamp }
    }
}

/// Pull-based input stream driven by the pulse loop.
#[async_trait]
pub trait Source: Send {
    /// Produce the next item, or `Ok(None)` when the stream is exhausted.
    async fn next(&mut self) -> Result<Option<StreamItem>, SourceError>;

    /// Release underlying resources. Must be idempotent; the pipeline calls
    /// this once on shutdown but a source may also be stopped by the host.
    fn stop(&mut self);
}

/// Errors raised while acquiring input.
#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    /// The underlying device or transport failed to deliver an item.
    #[error("failed to acquire input: {message}")]
    #[diagnostic(code(pulseline::stream::acquisition))]
    Acquisition { message: String },

    /// The source was asked for data after being stopped.
    #[error("source already stopped")]
    #[diagnostic(code(pulseline::stream::stopped))]
    Stopped,

    /// Payload could not be decoded into JSON.
    #[error(transparent)]
    #[diagnostic(code(pulseline::stream::serde_json))]
    Serde(#[from] serde_json::Error),
}
