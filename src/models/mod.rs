pub mod config;
pub mod state;
pub mod step;

pub use config::{
    FlowConfig, GeneratorConfig, GeneratorKind, GuardConfig, ScriptCommands, StorageConfig,
    TimeoutConfig, CONFIG_FILE,
};
pub use state::{
    BriefData, Candidate, ContentMatrix, CopyVariation, FileDescriptor, MatrixCell, Motivation,
    PrunedSelection, SelectionKind, WorkflowState, SCHEMA_VERSION,
};
pub use step::Step;
