//! Per-perceptor event emission.
//!
//! A perceptor that wants to surface domain events (a face appeared, a zone
//! was entered) declares its event names up front and hands the host an
//! [`EventEmitter`]. Subscribing to or emitting an undeclared name is an
//! error, which catches typos at wiring time instead of producing silently
//! dead handlers.

use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

/// Handler invoked synchronously for each emitted event.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Fixed-vocabulary event emitter.
///
/// The set of event names is sealed at construction; handlers fan out
/// synchronously on [`emit`](EventEmitter::emit).
pub struct EventEmitter {
    handlers: RwLock<FxHashMap<String, Vec<EventHandler>>>,
}

impl EventEmitter {
    /// Create an emitter for the given declared event names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let handlers = names
            .into_iter()
            .map(|n| (n.into(), Vec::new()))
            .collect();
        Self {
            handlers: RwLock::new(handlers),
        }
    }

    /// Declared event names, in no particular order.
    pub fn event_names(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }

    /// Subscribe a handler to a declared event.
    pub fn on(&self, name: &str, handler: EventHandler) -> Result<(), EventError> {
        let mut guard = self.handlers.write();
        match guard.get_mut(name) {
            Some(list) => {
                list.push(handler);
                Ok(())
            }
            None => Err(EventError::UndeclaredEvent {
                name: name.to_string(),
            }),
        }
    }

    /// Remove all handlers for a declared event.
    pub fn off(&self, name: &str) -> Result<(), EventError> {
        let mut guard = self.handlers.write();
        match guard.get_mut(name) {
            Some(list) => {
                list.clear();
                Ok(())
            }
            None => Err(EventError::UndeclaredEvent {
                name: name.to_string(),
            }),
        }
    }

    /// Invoke every handler subscribed to `name` with `payload`.
    ///
    /// A declared event with no subscribers is a no-op.
    pub fn emit(&self, name: &str, payload: &Value) -> Result<(), EventError> {
        let handlers: Vec<EventHandler> = {
            let guard = self.handlers.read();
            match guard.get(name) {
                Some(list) => list.clone(),
                None => {
                    return Err(EventError::UndeclaredEvent {
                        name: name.to_string(),
                    });
                }
            }
        };
        for handler in &handlers {
            handler(payload);
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.handlers.read();
        let mut names: Vec<&str> = guard.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("EventEmitter").field("events", &names).finish()
    }
}

/// Errors from event wiring and emission.
#[derive(Debug, Error, Diagnostic)]
pub enum EventError {
    /// The event name was not declared when the emitter was built.
    #[error("undeclared event: {name}")]
    #[diagnostic(
        code(pulseline::events::undeclared),
        help("Event names are fixed at emitter construction; check for typos.")
    )]
    UndeclaredEvent { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_every_subscriber() {
        let emitter = EventEmitter::new(["face_seen"]);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            emitter
                .on("face_seen", Arc::new(move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
        emitter.emit("face_seen", &json!({"id": 7})).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn undeclared_names_are_rejected() {
        let emitter = EventEmitter::new(["face_seen"]);
        assert!(emitter.on("face_sean", Arc::new(|_| {})).is_err());
        assert!(emitter.emit("face_sean", &json!(null)).is_err());
    }

    #[test]
    fn declared_but_unsubscribed_is_a_noop() {
        let emitter = EventEmitter::new(["face_seen"]);
        emitter.emit("face_seen", &json!(null)).unwrap();
    }

    #[test]
    fn off_clears_handlers() {
        let emitter = EventEmitter::new(["tick"]);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        emitter
            .on("tick", Arc::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        emitter.off("tick").unwrap();
        emitter.emit("tick", &json!(null)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
