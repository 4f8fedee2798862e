//! Workflow error taxonomy

use crate::models::{SelectionKind, Step};
use crate::orchestrator::GenerationCall;
use std::time::Duration;

/// Persisted store unavailable or refused the write
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    /// The stored bytes are not text; the record is unusable, not the store
    #[error("Stored record is not valid UTF-8: {0}")]
    Undecodable(String),

    #[error("Storage quota exceeded ({size} bytes)")]
    QuotaExceeded { size: usize },

    #[error("Failed to serialize workflow record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A transition or edit was refused; nothing was mutated
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Cannot enter step {step}: {reason}")]
    PreconditionFailed { step: Step, reason: String },

    #[error("Already at the terminal step")]
    AtTerminalStep,

    #[error("Already at the first step")]
    AtFirstStep,

    #[error("Step {step} has no generation call")]
    NoGenerationCall { step: Step },

    #[error("{call} needs step {required} but the workflow is at step {active}")]
    StepNotReached {
        call: GenerationCall,
        required: Step,
        active: Step,
    },

    #[error("{call} cannot run yet: {reason}")]
    MissingInput { call: GenerationCall, reason: String },

    #[error("Unknown {kind} id: {id}")]
    UnknownId { kind: SelectionKind, id: String },

    #[error("{action} is only allowed at step {expected}, workflow is at step {active}")]
    WrongStep {
        action: &'static str,
        expected: Step,
        active: Step,
    },

    #[error("No files to upload")]
    NoFiles,

    #[error("Step {step} has no failed generation to retry")]
    NothingToRetry { step: Step },

    #[error("Generation result for {call} does not match {expected}")]
    MismatchedResult {
        call: GenerationCall,
        expected: GenerationCall,
    },
}

/// Generation call failed or timed out
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("{call} timed out after {}s", after.as_secs())]
    Timeout { call: GenerationCall, after: Duration },

    #[error("{call} failed: {message}")]
    Remote {
        call: GenerationCall,
        message: String,
    },

    #[error("{call} returned an unusable response: {message}")]
    Malformed {
        call: GenerationCall,
        message: String,
    },

    #[error("{call} is not configured")]
    NotConfigured { call: GenerationCall },
}

impl GenerationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GenerationError::Timeout { .. })
    }
}

/// Umbrella error for state-machine operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Persisted record has schema version {found}, expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("Persisted record is malformed: {0}")]
    MalformedRecord(String),

    #[error("Progress dropped from step {from} to step 0 without an explicit reset")]
    AnomalousReset { from: Step },
}

impl WorkflowError {
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            WorkflowError::Validation(e) => Some(e),
            _ => None,
        }
    }
}
