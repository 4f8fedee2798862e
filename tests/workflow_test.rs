//! Integration tests for the step controller
//!
//! Covers the full brief-to-render flow and the generation lifecycle:
//! - Precondition-gated advancement
//! - Restore-on-readvance after retreat
//! - At most one in-flight generation per step
//! - Timeouts, retries, and stale results after cancellation

mod common;

use briefflow::models::{FileDescriptor, FlowConfig, SelectionKind, Step, TimeoutConfig};
use briefflow::orchestrator::{GenerationCall, TaskStatus};
use briefflow::state::{MemoryStore, PersistedStore};
use briefflow::workflow::{
    EventLog, StepController, TransitionCause, ValidationError, WorkflowEvent,
};
use common::{drive_to, generate, ScriptedGenerator};
use std::sync::Arc;
use std::time::Duration;

fn open(
    store: Arc<dyn PersistedStore>,
    generator: Arc<ScriptedGenerator>,
) -> (StepController, EventLog) {
    StepController::open_logged(store, generator, &FlowConfig::default())
}

#[tokio::test]
async fn test_full_brief_to_render_flow() {
    let store: Arc<dyn PersistedStore> = Arc::new(MemoryStore::new());
    let generator = ScriptedGenerator::new();
    let (mut controller, log) = open(store.clone(), generator.clone());

    // Step 0: upload and parse
    controller
        .upload_files(vec![FileDescriptor::new("brief.pdf", 48_213, "application/pdf")])
        .unwrap();
    generate(&mut controller, Step::Upload).await;
    assert_eq!(controller.advance().unwrap(), Step::Motivations);
    assert!(!controller.state().brief_confirmed);

    // Step 1: confirm, generate, select
    controller.confirm_brief().unwrap();
    generate(&mut controller, Step::Motivations).await;
    assert_eq!(controller.state().motivations.len(), 3);
    assert!(controller.advance().is_err());
    controller
        .select(SelectionKind::Motivations, vec!["m1".to_string()])
        .unwrap();
    assert_eq!(controller.advance().unwrap(), Step::Copy);

    // Step 2: copy for the selected motivation only
    generate(&mut controller, Step::Copy).await;
    assert!(controller
        .state()
        .copy_variations
        .iter()
        .all(|c| c.motivation_id == "m1"));
    assert_eq!(controller.advance().unwrap(), Step::Assets);

    // Steps 3-5
    generate(&mut controller, Step::Assets).await;
    controller
        .select(SelectionKind::Assets, vec!["a1".to_string()])
        .unwrap();
    controller.advance().unwrap();
    generate(&mut controller, Step::Templates).await;
    controller
        .select(SelectionKind::Templates, vec!["t1".to_string()])
        .unwrap();
    controller.advance().unwrap();
    generate(&mut controller, Step::Matrix).await;
    assert_eq!(
        controller.state().content_matrix.as_ref().unwrap().cells.len(),
        2
    );
    assert_eq!(controller.advance().unwrap(), Step::Ready);
    assert_eq!(store.load().unwrap().active_step, Step::Ready);

    // Step 6: render, record discarded by default
    controller.finish().unwrap();
    assert!(store.load().is_none());
    assert_eq!(controller.active_step(), Step::Upload);
    assert_eq!(log.count(|e| *e == WorkflowEvent::RenderDispatched), 1);
    assert!(controller.anomalies().is_empty());

    let advances = log.count(|e| {
        matches!(
            e,
            WorkflowEvent::StepChanged {
                cause: TransitionCause::Advance,
                ..
            }
        )
    });
    assert_eq!(advances, 6);
}

#[tokio::test]
async fn test_session_resumes_at_saved_step() {
    let store: Arc<dyn PersistedStore> = Arc::new(MemoryStore::new());
    let generator = ScriptedGenerator::new();
    let (mut first, _) = open(store.clone(), generator.clone());
    drive_to(&mut first, Step::Assets).await;
    drop(first);

    let (second, _) = open(store, generator);

    assert_eq!(second.active_step(), Step::Assets);
    assert_eq!(second.state().selected_motivation_ids.len(), 1);
    assert_eq!(second.state().copy_variations.len(), 2);
}

#[tokio::test]
async fn test_readvance_restores_instead_of_regenerating() {
    let generator = ScriptedGenerator::new();
    let (mut controller, _) = open(Arc::new(MemoryStore::new()), generator.clone());
    drive_to(&mut controller, Step::Templates).await;
    let before = controller.state().clone();

    controller.retreat().unwrap();
    controller.retreat().unwrap();
    assert_eq!(controller.active_step(), Step::Copy);
    controller.advance().unwrap();
    controller.advance().unwrap();

    let after = controller.state();
    assert_eq!(after.active_step, Step::Templates);
    assert_eq!(after.asset_candidates, before.asset_candidates);
    assert_eq!(after.selected_asset_ids, before.selected_asset_ids);
    assert_eq!(generator.calls(GenerationCall::GenerateAssets), 1);
    assert_eq!(generator.calls(GenerationCall::GenerateCopy), 1);
}

#[tokio::test]
async fn test_progress_is_monotonic_without_retreat() {
    let (mut controller, log) = open(Arc::new(MemoryStore::new()), ScriptedGenerator::new());
    drive_to(&mut controller, Step::Matrix).await;

    let mut last = 0;
    for event in log.events() {
        if let WorkflowEvent::StepChanged { to, .. } = event {
            assert!(to.index() >= last, "step went backwards to {}", to);
            last = to.index();
        }
    }
    assert_eq!(controller.high_water(), Step::Matrix);
}

#[tokio::test(start_paused = true)]
async fn test_double_request_runs_one_task() {
    let generator = ScriptedGenerator::new();
    let (mut controller, log) = open(Arc::new(MemoryStore::new()), generator.clone());
    drive_to(&mut controller, Step::Copy).await;
    generator.set_delay(Duration::from_secs(5));

    let first = controller.request_generation(Step::Copy).unwrap();
    let second = controller.request_generation(Step::Copy).unwrap();

    assert_eq!(first, second);
    assert_eq!(controller.generation_status(Step::Copy), TaskStatus::Pending(first));

    let event = controller.next_generation_event().await.unwrap();
    assert!(matches!(event, WorkflowEvent::GenerationSucceeded { step: Step::Copy, .. }));
    assert_eq!(generator.calls(GenerationCall::GenerateCopy), 1);
    assert_eq!(
        log.count(|e| matches!(e, WorkflowEvent::GenerationStarted(h) if h.step == Step::Copy)),
        1
    );
    assert!(controller.next_generation_event().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_retry() {
    let generator = ScriptedGenerator::new();
    let config = FlowConfig {
        timeouts: TimeoutConfig {
            generate_assets: 10,
            ..TimeoutConfig::default()
        },
        ..FlowConfig::default()
    };
    let (mut controller, _) =
        StepController::open_logged(Arc::new(MemoryStore::new()), generator.clone(), &config);
    drive_to(&mut controller, Step::Assets).await;

    generator.set_delay(Duration::from_secs(60));
    controller.request_generation(Step::Assets).unwrap();

    match controller.next_generation_event().await.unwrap() {
        WorkflowEvent::GenerationFailed { step, error } => {
            assert_eq!(step, Step::Assets);
            assert!(error.is_timeout());
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(controller.state().asset_candidates.is_empty());
    assert_eq!(controller.active_step(), Step::Assets);

    generator.set_delay(Duration::ZERO);
    controller.retry_generation(Step::Assets).unwrap();
    let event = controller.next_generation_event().await.unwrap();

    assert!(matches!(event, WorkflowEvent::GenerationSucceeded { step: Step::Assets, .. }));
    assert_eq!(controller.state().asset_candidates.len(), 2);
}

#[tokio::test]
async fn test_retry_requires_failure() {
    let generator = ScriptedGenerator::new();
    let (mut controller, _) = open(Arc::new(MemoryStore::new()), generator.clone());
    drive_to(&mut controller, Step::Motivations).await;
    controller.confirm_brief().unwrap();

    let err = controller.retry_generation(Step::Motivations).unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::NothingToRetry { step: Step::Motivations })
    );

    generator.fail_next(1);
    controller.request_generation(Step::Motivations).unwrap();
    let event = controller.next_generation_event().await.unwrap();
    assert!(matches!(event, WorkflowEvent::GenerationFailed { .. }));
    assert!(matches!(
        controller.generation_status(Step::Motivations),
        TaskStatus::Failed(_)
    ));

    controller.retry_generation(Step::Motivations).unwrap();
    let event = controller.next_generation_event().await.unwrap();
    assert!(matches!(event, WorkflowEvent::GenerationSucceeded { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_retreat_cancels_downstream_generation() {
    let generator = ScriptedGenerator::new();
    let (mut controller, log) = open(Arc::new(MemoryStore::new()), generator.clone());
    drive_to(&mut controller, Step::Copy).await;

    generator.set_delay(Duration::from_secs(5));
    controller.request_generation(Step::Copy).unwrap();
    controller.retreat().unwrap();

    assert_eq!(controller.generation_status(Step::Copy), TaskStatus::Idle);
    assert_eq!(
        log.count(|e| *e == WorkflowEvent::GenerationCancelled { step: Step::Copy }),
        1
    );

    // The aborted task never merges into the record
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(controller.process_ready_generations().is_empty());
    assert!(controller.state().copy_variations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stale_result_after_cancel_is_discarded() {
    let generator = ScriptedGenerator::new();
    let (mut controller, _) = open(Arc::new(MemoryStore::new()), generator.clone());
    drive_to(&mut controller, Step::Assets).await;

    generator.set_delay(Duration::from_secs(5));
    let stale = controller.request_generation(Step::Assets).unwrap();
    assert!(controller.cancel_generation(Step::Assets));

    generator.set_delay(Duration::from_secs(1));
    let fresh = controller.request_generation(Step::Assets).unwrap();
    assert_ne!(stale, fresh);

    match controller.next_generation_event().await.unwrap() {
        WorkflowEvent::GenerationSucceeded { step, .. } => assert_eq!(step, Step::Assets),
        other => panic!("unexpected event {:?}", other),
    }
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(controller.process_ready_generations().is_empty());
}

#[tokio::test]
async fn test_suspend_cancels_current_step_only() {
    let generator = ScriptedGenerator::with_delay(Duration::from_millis(200));
    let (mut controller, _) = open(Arc::new(MemoryStore::new()), generator);
    drive_to(&mut controller, Step::Templates).await;

    controller.request_generation(Step::Templates).unwrap();
    controller.suspend();

    assert_eq!(controller.generation_status(Step::Templates), TaskStatus::Idle);
    assert_eq!(controller.active_step(), Step::Templates);
}

#[tokio::test]
async fn test_generation_for_unreached_step_is_refused() {
    let (mut controller, _) = open(Arc::new(MemoryStore::new()), ScriptedGenerator::new());

    let err = controller.request_generation(Step::Assets).unwrap_err();

    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::StepNotReached { required: Step::Assets, active: Step::Upload, .. })
    ));
}

#[tokio::test]
async fn test_brief_text_parse() {
    let (mut controller, _) = open(Arc::new(MemoryStore::new()), ScriptedGenerator::new());

    controller.parse_brief_text("Reach new runners").unwrap();
    controller.next_generation_event().await.unwrap();

    assert_eq!(
        controller.state().brief_data.as_ref().unwrap().objective,
        "Reach new runners"
    );
    // Files are still required before leaving the upload step
    assert!(controller.advance().is_err());
}

#[tokio::test]
async fn test_motivation_deselect_drops_copy_and_matrix() {
    let (mut controller, log) = open(Arc::new(MemoryStore::new()), ScriptedGenerator::new());
    drive_to(&mut controller, Step::Ready).await;
    assert!(controller.state().content_matrix.is_some());

    for _ in 0..5 {
        controller.retreat().unwrap();
    }
    assert_eq!(controller.active_step(), Step::Motivations);
    controller
        .select(SelectionKind::Motivations, vec!["m2".to_string()])
        .unwrap();

    let state = controller.state();
    assert!(state.copy_variations.is_empty());
    assert!(state.content_matrix.is_none());
    assert!(log.count(|e| matches!(e, WorkflowEvent::DataChanged { what: "selection", .. })) >= 1);

    // Copy must be regenerated before the copy step can be left
    controller.advance().unwrap();
    assert!(controller.advance().is_err());
}

#[tokio::test]
async fn test_remove_motivation_outside_its_step_is_refused() {
    let (mut controller, _) = open(Arc::new(MemoryStore::new()), ScriptedGenerator::new());
    drive_to(&mut controller, Step::Ready).await;
    let before = controller.state().clone();

    let err = controller.remove_motivation("m1").unwrap_err();

    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::WrongStep {
            expected: Step::Motivations,
            active: Step::Ready,
            ..
        })
    ));
    assert_eq!(controller.state(), &before);
    controller.finish().unwrap();
}
