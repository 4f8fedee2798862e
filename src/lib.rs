// Briefflow - Campaign Brief Workflow Engine
// A persisted, resumable state machine driving brief → motivations → copy → assets → templates → matrix → render

pub mod cli;
pub mod models;
pub mod orchestrator;
pub mod state;
pub mod workflow;

pub use anyhow::{Context, Result};
pub use colored::Colorize;

// Re-export commonly used types
pub use models::{FlowConfig, SelectionKind, Step, WorkflowState};
pub use orchestrator::{ContentGenerator, GenerationCall, GenerationOutput};
pub use state::{FileStore, MemoryStore, PersistedStore};
pub use workflow::{StepController, WorkflowError, WorkflowEvent};
