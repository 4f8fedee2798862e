//! Transition events and observers

use super::{AnomalyRecord, GenerationError, TransitionCause};
use crate::models::{PrunedSelection, Step};
use crate::orchestrator::{GenerationCall, TaskHandle};
use crate::state::WriteConflict;
use std::sync::{Arc, Mutex};

/// How the session's starting state was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOrigin {
    /// A valid saved record was loaded
    Restored,
    /// Nothing was saved
    Fresh,
    /// A saved record existed but was unusable
    Discarded { reason: String },
    /// The store could not be read
    StorageUnavailable { error: String },
}

/// Everything the controller reports to observers
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    SessionStarted {
        step: Step,
        origin: SessionOrigin,
    },
    StepChanged {
        from: Step,
        to: Step,
        cause: TransitionCause,
    },
    /// Step data was edited without changing the step
    DataChanged {
        step: Step,
        what: &'static str,
    },
    GenerationStarted(TaskHandle),
    GenerationSucceeded {
        step: Step,
        call: GenerationCall,
    },
    GenerationFailed {
        step: Step,
        error: GenerationError,
    },
    GenerationCancelled {
        step: Step,
    },
    SelectionPruned(PrunedSelection),
    /// A save failed; the session continues in memory
    StorageDegraded {
        error: String,
    },
    /// Another context had written a newer record; ours replaced it
    ConflictDetected(WriteConflict),
    AnomalousReset(AnomalyRecord),
    SessionCleared,
    RenderDispatched,
}

/// Receives controller events
pub trait WorkflowObserver: Send + Sync {
    fn on_event(&self, event: &WorkflowEvent);
}

impl<F> WorkflowObserver for F
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    fn on_event(&self, event: &WorkflowEvent) {
        self(event)
    }
}

/// Observer that records every event it sees
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&WorkflowEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| predicate(e))
            .count()
    }
}

impl WorkflowObserver for EventLog {
    fn on_event(&self, event: &WorkflowEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
