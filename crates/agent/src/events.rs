//! Event registry: one handler per event name.
//!
//! Emission never fails from the emitter's point of view: a handler that
//! returns an error (or panics) is logged and the run carries on.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tracing::{trace, warn};
use turngraph_core::event::{EventData, EventHandler};

/// Maps event names to their handler.
#[derive(Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`, replacing any previous handler.
    pub fn register(&self, event: impl AsRef<str>, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(event.as_ref().to_string(), handler);
    }

    /// Deliver an event to its handler, if one is registered.
    ///
    /// Completes once the handler has finished or failed.
    pub async fn emit(
        &self,
        event: impl AsRef<str>,
        data: &EventData,
        metadata: Option<&serde_json::Value>,
    ) {
        let event = event.as_ref();
        let Some(handler) = self.get(event) else {
            return;
        };

        trace!(event, "Emitting event");

        let outcome = AssertUnwindSafe(handler.handle(event, data, metadata))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(event, error = %e, "Event handler failed"),
            Err(_) => warn!(event, "Event handler panicked"),
        }
    }

    pub fn has(&self, event: impl AsRef<str>) -> bool {
        self.read().contains_key(event.as_ref())
    }

    pub fn get(&self, event: impl AsRef<str>) -> Option<Arc<dyn EventHandler>> {
        self.read().get(event.as_ref()).cloned()
    }

    /// Drop every handler.
    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn EventHandler>>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("EventRegistry")
            .field("events", &names)
            .finish()
    }
}
