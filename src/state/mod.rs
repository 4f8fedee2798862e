//! Workflow Record Persistence
//!
//! Handles durable storage of the session's workflow record, including:
//! - Tolerant loading (malformed or outdated records read as absent)
//! - Atomic writes
//! - Cross-context conflict detection on save

mod store;

pub use store::{
    decode_record, FileStore, LoadOutcome, MemoryStore, PersistedStore, SaveReport, WriteConflict,
};
