//! Event recording.

use std::sync::Mutex;

use runrelay_reconcile::{RunEvent, RunKey};
use tracing::info;

/// Receives events produced by reconciliation passes.
pub trait EventRecorder: Send + Sync {
    fn record(&self, key: &RunKey, event: &RunEvent);
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn record(&self, key: &RunKey, event: &RunEvent) {
        info!(
            run = %key,
            event_type = ?event.event_type,
            reason = %event.reason,
            message = %event.message,
            "Run event"
        );
    }
}

/// Keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryEventRecorder {
    events: Mutex<Vec<(RunKey, RunEvent)>>,
}

impl MemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far.
    pub fn events(&self) -> Vec<(RunKey, RunEvent)> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Events recorded for one Run.
    pub fn events_for(&self, key: &RunKey) -> Vec<RunEvent> {
        self.events()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, e)| e)
            .collect()
    }
}

impl EventRecorder for MemoryEventRecorder {
    fn record(&self, key: &RunKey, event: &RunEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key.clone(), event.clone()));
    }
}
