//! PersistedStore - durable key/value slot for one session's record

use crate::models::{WorkflowState, SCHEMA_VERSION};
use crate::workflow::{StorageError, WorkflowError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Result of reading the persisted record
#[derive(Debug)]
pub enum LoadOutcome {
    /// A valid record of the current schema
    Restored(WorkflowState),
    /// Nothing stored for this session
    Empty,
    /// A record exists but cannot be used (bad JSON, wrong version)
    Discarded(WorkflowError),
    /// The storage backend itself failed
    Unavailable(StorageError),
}

impl LoadOutcome {
    /// Collapse to "state or absent"
    pub fn into_state(self) -> Option<WorkflowState> {
        match self {
            LoadOutcome::Restored(state) => Some(state),
            _ => None,
        }
    }
}

/// Write-side report of a checked save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// Set when another writer stored a newer record since we last saw it
    pub conflict: Option<WriteConflict>,
}

/// Another context wrote the record after our last known write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteConflict {
    pub stored_at: DateTime<Utc>,
    pub known_at: Option<DateTime<Utc>>,
}

/// Minimal view used to compare timestamps without a full decode
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordStamp {
    updated_at: DateTime<Utc>,
}

/// Decode a raw record, rejecting malformed data and other schema versions
pub fn decode_record(raw: &str) -> LoadOutcome {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => return LoadOutcome::Discarded(WorkflowError::MalformedRecord(e.to_string())),
    };

    let version = value.get("version").and_then(|v| v.as_u64());
    if version != Some(u64::from(SCHEMA_VERSION)) {
        let found = version.and_then(|v| u32::try_from(v).ok()).unwrap_or(0);
        return LoadOutcome::Discarded(WorkflowError::SchemaMismatch {
            found,
            expected: SCHEMA_VERSION,
        });
    }

    match serde_json::from_value(value) {
        Ok(state) => LoadOutcome::Restored(state),
        Err(e) => LoadOutcome::Discarded(WorkflowError::MalformedRecord(e.to_string())),
    }
}

/// Durable storage for one session's workflow record
///
/// Implementations provide a single atomic read-modify-write primitive;
/// everything else is built on it.
pub trait PersistedStore: Send + Sync {
    /// Human-readable scope (session key or path), for logs
    fn scope(&self) -> String;

    /// Read the raw record, if any
    fn read_raw(&self) -> Result<Option<String>, StorageError>;

    /// Atomically replace the record with the value `f` returns.
    ///
    /// `f` sees the current raw record. Returning `Ok(None)` leaves the slot
    /// untouched.
    fn update(
        &self,
        f: &mut dyn FnMut(Option<&str>) -> Result<Option<String>, StorageError>,
    ) -> Result<(), StorageError>;

    /// Remove the record
    fn clear(&self) -> Result<(), StorageError>;

    /// Load with the reason a record was not usable
    fn load_detailed(&self) -> LoadOutcome {
        match self.read_raw() {
            Ok(Some(raw)) => {
                let outcome = decode_record(&raw);
                if let LoadOutcome::Discarded(reason) = &outcome {
                    warn!(scope = %self.scope(), %reason, "discarding persisted workflow record");
                }
                outcome
            }
            Ok(None) => LoadOutcome::Empty,
            Err(StorageError::Undecodable(reason)) => {
                warn!(scope = %self.scope(), %reason, "discarding persisted workflow record");
                LoadOutcome::Discarded(WorkflowError::MalformedRecord(reason))
            }
            Err(e) => {
                warn!(scope = %self.scope(), error = %e, "failed to read persisted workflow record");
                LoadOutcome::Unavailable(e)
            }
        }
    }

    /// Load the record, treating anything unusable as absent
    fn load(&self) -> Option<WorkflowState> {
        self.load_detailed().into_state()
    }

    /// Unconditionally write the record
    fn save(&self, state: &WorkflowState) -> Result<(), StorageError> {
        let record = serde_json::to_string(state)?;
        self.update(&mut |_| Ok(Some(record.clone())))
    }

    /// Write the record, reporting if a newer record than `known_at` was
    /// overwritten. Last writer wins.
    fn save_checked(
        &self,
        state: &WorkflowState,
        known_at: Option<DateTime<Utc>>,
    ) -> Result<SaveReport, StorageError> {
        let record = serde_json::to_string(state)?;
        let mut conflict = None;

        self.update(&mut |current| {
            conflict = current
                .and_then(|raw| serde_json::from_str::<RecordStamp>(raw).ok())
                .filter(|stamp| known_at.map_or(true, |known| stamp.updated_at > known))
                .map(|stamp| WriteConflict {
                    stored_at: stamp.updated_at,
                    known_at,
                });
            Ok(Some(record.clone()))
        })?;

        Ok(SaveReport { conflict })
    }
}

fn check_quota(quota: Option<usize>, record: &str) -> Result<(), StorageError> {
    match quota {
        Some(limit) if record.len() > limit => Err(StorageError::QuotaExceeded { size: record.len() }),
        _ => Ok(()),
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-process store; share it through an `Arc` to model several tabs
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject records larger than `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            slot: Mutex::new(None),
            quota: Some(bytes),
        }
    }

    /// Seed the slot with an arbitrary raw record
    pub fn put_raw(&self, raw: impl Into<String>) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(raw.into());
    }
}

impl PersistedStore for MemoryStore {
    fn scope(&self) -> String {
        "memory".to_string()
    }

    fn read_raw(&self) -> Result<Option<String>, StorageError> {
        Ok(self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn update(
        &self,
        f: &mut dyn FnMut(Option<&str>) -> Result<Option<String>, StorageError>,
    ) -> Result<(), StorageError> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = f(slot.as_deref())? {
            check_quota(self.quota, &next)?;
            *slot = Some(next);
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// One JSON file per session under a storage directory
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    quota: Option<usize>,
    lock: Mutex<()>,
}

impl FileStore {
    /// Store for `session` under `dir` (`<dir>/<session>.json`)
    pub fn new(dir: impl AsRef<Path>, session: &str) -> Self {
        Self::at_path(dir.as_ref().join(format!("{}.json", session)))
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota: None,
            lock: Mutex::new(()),
        }
    }

    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<Option<String>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| StorageError::Undecodable(e.to_string()))
    }

    fn write_file(&self, content: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Atomic write
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;

        debug!(path = %self.path.display(), bytes = content.len(), "workflow record written");
        Ok(())
    }
}

impl PersistedStore for FileStore {
    fn scope(&self) -> String {
        self.path.display().to_string()
    }

    fn read_raw(&self) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_file()
    }

    fn update(
        &self,
        f: &mut dyn FnMut(Option<&str>) -> Result<Option<String>, StorageError>,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        // A corrupt record is overwritten as if absent
        let current = match self.read_file() {
            Err(StorageError::Undecodable(_)) => None,
            other => other?,
        };
        if let Some(next) = f(current.as_deref())? {
            check_quota(self.quota, &next)?;
            self.write_file(&next)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
