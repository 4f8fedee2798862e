//! Integration tests for persistence and cross-context behavior
//!
//! Tests how the controller interacts with the persisted store:
//! - Storage failures never surface as a reset to step 0
//! - Outdated, corrupt, or unreadable records
//! - Conflicting writers sharing one record
//! - Reset guard in strict and log-only modes
//! - Render completion and retention

mod common;

use briefflow::models::{FileDescriptor, FlowConfig, Step, StorageConfig, WorkflowState};
use briefflow::state::{FileStore, LoadOutcome, MemoryStore, PersistedStore};
use briefflow::workflow::{
    GuardMode, SessionOrigin, StepController, SyncOutcome, TransitionCause, WorkflowError,
    WorkflowEvent,
};
use common::{drive_to, record_at, FlakyStore, ScriptedGenerator};
use std::sync::Arc;
use tempfile::TempDir;

fn config_with_guard(mode: GuardMode) -> FlowConfig {
    let mut config = FlowConfig::default();
    config.guard.mode = mode;
    config
}

#[tokio::test]
async fn test_save_failure_never_reads_back_as_reset() {
    let store = FlakyStore::new();
    let generator = ScriptedGenerator::new();
    let (mut controller, log) =
        StepController::open_logged(store.clone(), generator.clone(), &FlowConfig::default());
    drive_to(&mut controller, Step::Templates).await;

    store.fail_writes(true);
    controller.retreat().unwrap();
    controller.advance().unwrap();

    // In-memory progress is intact and the store still holds step 4
    assert_eq!(controller.active_step(), Step::Templates);
    assert!(controller.is_degraded());
    assert!(log.count(|e| matches!(e, WorkflowEvent::StorageDegraded { .. })) >= 1);
    assert_eq!(store.load().unwrap().active_step, Step::Templates);

    // A new session over the same store resumes at step 4, not 0
    drop(controller);
    let (reopened, _) = StepController::open_logged(store, generator, &FlowConfig::default());
    assert_eq!(reopened.active_step(), Step::Templates);
}

#[tokio::test]
async fn test_store_recovers_after_degraded_save() {
    let store = FlakyStore::new();
    let (mut controller, _) = StepController::open_logged(
        store.clone(),
        ScriptedGenerator::new(),
        &FlowConfig::default(),
    );
    drive_to(&mut controller, Step::Assets).await;

    store.fail_writes(true);
    controller.retreat().unwrap();
    assert!(controller.is_degraded());
    assert_eq!(store.load().unwrap().active_step, Step::Assets);

    store.fail_writes(false);
    controller.advance().unwrap();

    assert!(!controller.is_degraded());
    assert_eq!(store.load().unwrap().active_step, Step::Assets);
}

#[tokio::test]
async fn test_unreadable_store_is_not_overwritten() {
    let store = FlakyStore::new();
    let generator = ScriptedGenerator::new();
    let (mut first, _) =
        StepController::open_logged(store.clone(), generator.clone(), &FlowConfig::default());
    drive_to(&mut first, Step::Assets).await;
    drop(first);

    store.fail_reads(true);
    let (mut second, log) =
        StepController::open_logged(store.clone(), generator, &FlowConfig::default());

    assert_eq!(second.active_step(), Step::Upload);
    assert!(second.is_detached());
    assert!(matches!(
        log.events()[0],
        WorkflowEvent::SessionStarted {
            origin: SessionOrigin::StorageUnavailable { .. },
            ..
        }
    ));

    // Edits while detached never reach the saved record
    second.reset_to_start();
    store.fail_reads(false);
    assert_eq!(store.load().unwrap().active_step, Step::Assets);
}

#[tokio::test]
async fn test_detached_session_adopts_record_on_sync() {
    let store = FlakyStore::new();
    store.save(&record_at(Step::Copy, 0)).unwrap();
    store.fail_reads(true);
    let (mut controller, _) = StepController::open_logged(
        store.clone(),
        ScriptedGenerator::new(),
        &FlowConfig::default(),
    );

    store.fail_reads(false);
    let outcome = controller.sync_from_store().unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Adopted {
            from: Step::Upload,
            to: Step::Copy,
        }
    );
    assert!(!controller.is_detached());
    assert!(!controller.is_degraded());
    assert!(controller.anomalies().is_empty());
}

#[test]
fn test_outdated_schema_starts_fresh() {
    let store = Arc::new(MemoryStore::new());
    store.put_raw(r#"{"version":0,"activeStep":4,"updatedAt":"2025-01-01T00:00:00Z"}"#);

    let (controller, log) =
        StepController::open_logged(store.clone(), ScriptedGenerator::new(), &FlowConfig::default());

    assert_eq!(controller.active_step(), Step::Upload);
    assert!(matches!(
        &log.events()[0],
        WorkflowEvent::SessionStarted {
            origin: SessionOrigin::Discarded { reason },
            ..
        } if reason.contains("schema version 0")
    ));
    assert_eq!(log.count(|e| matches!(e, WorkflowEvent::ConflictDetected(_))), 0);
    assert!(matches!(store.load_detailed(), LoadOutcome::Restored(_)));
}

#[test]
fn test_garbage_record_starts_fresh() {
    let temp = TempDir::new().unwrap();
    let store = FileStore::new(temp.path(), "default");
    std::fs::write(store.path(), "{ not json").unwrap();

    let (controller, _) = StepController::open_logged(
        Arc::new(store),
        ScriptedGenerator::new(),
        &FlowConfig::default(),
    );

    assert_eq!(controller.active_step(), Step::Upload);
    assert!(!controller.is_degraded());
}

#[tokio::test]
async fn test_file_store_session_round_trip() {
    let temp = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new();
    let open = || {
        StepController::open_logged(
            Arc::new(FileStore::new(temp.path(), "spring")),
            generator.clone(),
            &FlowConfig::default(),
        )
    };

    let (mut first, _) = open();
    drive_to(&mut first, Step::Matrix).await;
    let saved = first.state().clone();
    drop(first);

    let (second, log) = open();
    assert_eq!(second.state(), &saved);
    assert!(matches!(
        log.events()[0],
        WorkflowEvent::SessionStarted {
            origin: SessionOrigin::Restored,
            ..
        }
    ));
}

#[test]
fn test_corrupt_session_file_starts_fresh_and_attached() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(temp.path(), "spring"));
    std::fs::write(store.path(), [0xff, 0xfe, 0x00, 0x7b]).unwrap();

    let (mut controller, log) =
        StepController::open_logged(store.clone(), ScriptedGenerator::new(), &FlowConfig::default());

    assert!(matches!(
        log.events()[0],
        WorkflowEvent::SessionStarted {
            origin: SessionOrigin::Discarded { .. },
            ..
        }
    ));
    assert!(!controller.is_detached());
    assert!(!controller.is_degraded());

    controller
        .upload_files(vec![FileDescriptor::new("brief.pdf", 2048, "application/pdf")])
        .unwrap();
    let saved = store.load().expect("record should be rewritten");
    assert_eq!(saved.uploaded_files.len(), 1);
    assert!(matches!(store.load_detailed(), LoadOutcome::Restored(_)));
}

#[tokio::test]
async fn test_retreat_to_upload_in_other_tab_is_not_anomalous() {
    let store: Arc<dyn PersistedStore> = Arc::new(MemoryStore::new());
    let generator = ScriptedGenerator::new();
    let (mut tab_a, _) =
        StepController::open_logged(store.clone(), generator.clone(), &FlowConfig::default());
    drive_to(&mut tab_a, Step::Motivations).await;

    let (mut tab_b, log_b) =
        StepController::open_logged(store.clone(), generator.clone(), &FlowConfig::default());
    assert_eq!(tab_b.active_step(), Step::Motivations);

    tab_a.retreat().unwrap();
    let outcome = tab_b.sync_from_store().unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Adopted {
            from: Step::Motivations,
            to: Step::Upload,
        }
    );
    assert!(tab_a.anomalies().is_empty());
    assert!(tab_b.anomalies().is_empty());
    assert_eq!(log_b.count(|e| matches!(e, WorkflowEvent::AnomalousReset(_))), 0);
    assert_eq!(store.load().unwrap().active_step, Step::Upload);
}

#[tokio::test]
async fn test_conflicting_writer_is_reported() {
    let store: Arc<dyn PersistedStore> = Arc::new(MemoryStore::new());
    let generator = ScriptedGenerator::new();
    let (mut tab_a, _) =
        StepController::open_logged(store.clone(), generator.clone(), &FlowConfig::default());
    drive_to(&mut tab_a, Step::Assets).await;

    let (mut tab_b, log_b) =
        StepController::open_logged(store.clone(), generator.clone(), &FlowConfig::default());
    assert_eq!(tab_b.active_step(), Step::Assets);

    // A moves on; B still believes the record is at step 3
    tab_a.retreat().unwrap();
    tab_a.retreat().unwrap();
    tab_b.retreat().unwrap();

    assert_eq!(log_b.count(|e| matches!(e, WorkflowEvent::ConflictDetected(_))), 1);
    // Last writer wins
    assert_eq!(store.load().unwrap().active_step, Step::Copy);
}

#[tokio::test]
async fn test_sync_adopts_progress_from_other_context() {
    let store: Arc<dyn PersistedStore> = Arc::new(MemoryStore::new());
    let generator = ScriptedGenerator::new();
    let (mut tab_a, _) =
        StepController::open_logged(store.clone(), generator.clone(), &FlowConfig::default());
    let (mut tab_b, log_b) =
        StepController::open_logged(store.clone(), generator.clone(), &FlowConfig::default());

    drive_to(&mut tab_a, Step::Assets).await;
    assert_eq!(tab_b.sync_from_store().unwrap(), SyncOutcome::Adopted {
        from: Step::Upload,
        to: Step::Assets,
    });
    assert_eq!(tab_b.sync_from_store().unwrap(), SyncOutcome::UpToDate);
    assert_eq!(tab_b.high_water(), Step::Assets);
    assert_eq!(
        log_b.count(|e| matches!(
            e,
            WorkflowEvent::StepChanged {
                cause: TransitionCause::StoreSync,
                ..
            }
        )),
        1
    );
}

#[tokio::test]
async fn test_strict_guard_refuses_silent_reset() {
    let store: Arc<dyn PersistedStore> = Arc::new(MemoryStore::new());
    let (mut controller, log) = StepController::open_logged(
        store.clone(),
        ScriptedGenerator::new(),
        &config_with_guard(GuardMode::Strict),
    );
    drive_to(&mut controller, Step::Assets).await;

    // Something outside the controller writes step 0 without an epoch bump
    store.save(&record_at(Step::Upload, 0)).unwrap();
    let err = controller.sync_from_store().unwrap_err();

    assert!(matches!(err, WorkflowError::AnomalousReset { from: Step::Assets }));
    assert_eq!(controller.active_step(), Step::Assets);
    assert_eq!(store.load().unwrap().active_step, Step::Assets);
    assert_eq!(controller.anomalies().len(), 1);
    assert!(controller.anomalies()[0].reverted);
    assert_eq!(log.count(|e| matches!(e, WorkflowEvent::AnomalousReset(_))), 1);
    assert_eq!(log.count(|e| matches!(e, WorkflowEvent::ConflictDetected(_))), 0);
}

#[tokio::test]
async fn test_log_only_guard_records_and_accepts() {
    let store: Arc<dyn PersistedStore> = Arc::new(MemoryStore::new());
    let (mut controller, log) = StepController::open_logged(
        store.clone(),
        ScriptedGenerator::new(),
        &config_with_guard(GuardMode::LogOnly),
    );
    drive_to(&mut controller, Step::Copy).await;

    store.save(&record_at(Step::Upload, 0)).unwrap();
    let outcome = controller.sync_from_store().unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Adopted {
            from: Step::Copy,
            to: Step::Upload,
        }
    );
    assert_eq!(controller.active_step(), Step::Upload);
    assert_eq!(controller.anomalies().len(), 1);
    assert!(!controller.anomalies()[0].reverted);
    assert_eq!(log.count(|e| matches!(e, WorkflowEvent::AnomalousReset(_))), 1);
}

#[tokio::test]
async fn test_explicit_reset_elsewhere_is_not_anomalous() {
    let store: Arc<dyn PersistedStore> = Arc::new(MemoryStore::new());
    let generator = ScriptedGenerator::new();
    let (mut tab_a, _) =
        StepController::open_logged(store.clone(), generator.clone(), &FlowConfig::default());
    drive_to(&mut tab_a, Step::Templates).await;
    let (mut tab_b, _) =
        StepController::open_logged(store.clone(), generator.clone(), &FlowConfig::default());

    tab_b.reset_to_start();
    let outcome = tab_a.sync_from_store().unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Adopted {
            from: Step::Templates,
            to: Step::Upload,
        }
    );
    assert!(tab_a.anomalies().is_empty());
    assert_eq!(tab_a.state().reset_epoch, 1);
    assert_eq!(tab_a.high_water(), Step::Upload);
}

#[tokio::test]
async fn test_finish_retains_record_when_configured() {
    let store: Arc<dyn PersistedStore> = Arc::new(MemoryStore::new());
    let config = FlowConfig {
        storage: StorageConfig {
            retain_on_complete: true,
            ..StorageConfig::default()
        },
        ..FlowConfig::default()
    };
    let (mut controller, log) =
        StepController::open_logged(store.clone(), ScriptedGenerator::new(), &config);
    drive_to(&mut controller, Step::Ready).await;

    controller.finish().unwrap();

    assert_eq!(controller.active_step(), Step::Ready);
    assert_eq!(store.load().unwrap().active_step, Step::Ready);
    assert_eq!(log.count(|e| *e == WorkflowEvent::SessionCleared), 0);
}

#[tokio::test]
async fn test_finish_surfaces_storage_failure() {
    let store = FlakyStore::new();
    let (mut controller, log) = StepController::open_logged(
        store.clone(),
        ScriptedGenerator::new(),
        &FlowConfig::default(),
    );
    drive_to(&mut controller, Step::Ready).await;

    store.fail_writes(true);
    let err = controller.finish().unwrap_err();

    assert!(matches!(err, WorkflowError::Storage(_)));
    assert_eq!(controller.active_step(), Step::Ready);
    assert_eq!(log.count(|e| *e == WorkflowEvent::RenderDispatched), 0);

    store.fail_writes(false);
    controller.finish().unwrap();
    assert!(store.load().is_none());
}

#[test]
fn test_restored_session_keeps_reset_epoch() {
    let store = Arc::new(MemoryStore::new());
    let mut finished = WorkflowState::fresh(3);
    finished.touch();
    store.save(&finished).unwrap();

    let (controller, _) =
        StepController::open_logged(store, ScriptedGenerator::new(), &FlowConfig::default());

    assert_eq!(controller.state().reset_epoch, 3);
    assert!(controller.state().uploaded_files.is_empty());
}
