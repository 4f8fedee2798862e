//! Workflow state machine
//!
//! - `registry`: static step table with entry preconditions
//! - `controller`: the only writer of the workflow record
//! - `guard`: anomalous-reset detection
//! - `events`: observer notifications

mod controller;
mod error;
mod events;
mod guard;
mod registry;

pub use controller::{ControllerBuilder, StepController, SyncOutcome};
pub use error::{GenerationError, StorageError, ValidationError, WorkflowError};
pub use events::{EventLog, SessionOrigin, WorkflowEvent, WorkflowObserver};
pub use guard::{AnomalyRecord, GuardMode, GuardVerdict, ResetGuard, TransitionCause};
pub use registry::{Precondition, StepRegistry, StepSpec};
