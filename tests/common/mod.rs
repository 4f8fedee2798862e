//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use briefflow::models::{
    BriefData, Candidate, ContentMatrix, CopyVariation, FileDescriptor, MatrixCell, Motivation,
    SelectionKind, Step, WorkflowState,
};
use briefflow::orchestrator::{ContentGenerator, GenerationCall};
use briefflow::state::{MemoryStore, PersistedStore};
use briefflow::workflow::{GenerationError, StepController, StorageError, WorkflowEvent};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Generator double
// =============================================================================

/// Deterministic generator with optional latency and injected failures
#[derive(Default)]
pub struct ScriptedGenerator {
    delay: Mutex<Duration>,
    failures: AtomicUsize,
    calls: Mutex<HashMap<GenerationCall, usize>>,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let generator = Self::default();
        *generator.delay.lock().unwrap() = delay;
        Arc::new(generator)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Fail the next `n` calls with a remote error
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self, call: GenerationCall) -> usize {
        self.calls.lock().unwrap().get(&call).copied().unwrap_or(0)
    }

    async fn begin(&self, call: GenerationCall) -> Result<(), GenerationError> {
        *self.calls.lock().unwrap().entry(call).or_insert(0) += 1;
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(GenerationError::Remote {
                call,
                message: "upstream returned 503".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn parse_brief(
        &self,
        _files: &[FileDescriptor],
        text: Option<&str>,
    ) -> Result<BriefData, GenerationError> {
        self.begin(GenerationCall::ParseBrief).await?;
        Ok(BriefData {
            objective: text.unwrap_or("Launch the spring collection").to_string(),
            target_audience: "Young professionals".to_string(),
            key_messages: vec!["Fresh".to_string(), "Affordable".to_string()],
            ..BriefData::default()
        })
    }

    async fn generate_motivations(&self, _: &BriefData) -> Result<Vec<Motivation>, GenerationError> {
        self.begin(GenerationCall::GenerateMotivations).await?;
        Ok(vec![
            motivation("m1", "Confidence", 0.91),
            motivation("m2", "Belonging", 0.74),
            motivation("m3", "Thrift", 0.42),
        ])
    }

    async fn generate_copy(
        &self,
        motivations: &[Motivation],
        _: &BriefData,
    ) -> Result<Vec<CopyVariation>, GenerationError> {
        self.begin(GenerationCall::GenerateCopy).await?;
        Ok(motivations
            .iter()
            .flat_map(|m| {
                (1..=2).map(move |n| CopyVariation {
                    id: format!("c-{}-{}", m.id, n),
                    motivation_id: m.id.clone(),
                    text: format!("{} #{}", m.title, n),
                })
            })
            .collect())
    }

    async fn generate_assets(&self, _: &[CopyVariation]) -> Result<Vec<Candidate>, GenerationError> {
        self.begin(GenerationCall::GenerateAssets).await?;
        Ok(vec![candidate("a1", "Hero shot"), candidate("a2", "Lifestyle")])
    }

    async fn select_templates(
        &self,
        _: &[CopyVariation],
        _: &[Candidate],
    ) -> Result<Vec<Candidate>, GenerationError> {
        self.begin(GenerationCall::SelectTemplates).await?;
        Ok(vec![candidate("t1", "Story 9:16"), candidate("t2", "Feed 1:1")])
    }

    async fn build_matrix(
        &self,
        copy: &[CopyVariation],
        assets: &[String],
        templates: &[String],
    ) -> Result<ContentMatrix, GenerationError> {
        self.begin(GenerationCall::BuildMatrix).await?;
        let mut cells = Vec::new();
        for c in copy {
            for a in assets {
                for t in templates {
                    cells.push(MatrixCell {
                        copy_id: c.id.clone(),
                        asset_id: a.clone(),
                        template_id: t.clone(),
                    });
                }
            }
        }
        Ok(ContentMatrix { cells })
    }
}

pub fn motivation(id: &str, title: &str, score: f64) -> Motivation {
    Motivation {
        id: id.to_string(),
        title: title.to_string(),
        score,
        body: format!("{} resonates with the audience", title),
    }
}

pub fn candidate(id: &str, name: &str) -> Candidate {
    Candidate {
        id: id.to_string(),
        name: name.to_string(),
        kind: None,
    }
}

// =============================================================================
// Store double
// =============================================================================

/// Memory store whose reads and writes can be switched off
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn unavailable() -> StorageError {
        StorageError::Unavailable(io::Error::new(io::ErrorKind::Other, "disk detached"))
    }
}

impl PersistedStore for FlakyStore {
    fn scope(&self) -> String {
        "flaky".to_string()
    }

    fn read_raw(&self) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.read_raw()
    }

    fn update(
        &self,
        f: &mut dyn FnMut(Option<&str>) -> Result<Option<String>, StorageError>,
    ) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.update(f)
    }

    fn clear(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.clear()
    }
}

// =============================================================================
// Driving the workflow
// =============================================================================

/// Run the step's generation and merge it, panicking on failure
pub async fn generate(controller: &mut StepController, step: Step) {
    controller.request_generation(step).unwrap();
    match controller.next_generation_event().await {
        Some(WorkflowEvent::GenerationSucceeded { step: settled, .. }) if settled == step => {}
        other => panic!("expected generation for step {} to succeed, got {:?}", step, other),
    }
}

/// Walk the happy path from wherever the controller is up to `target`
pub async fn drive_to(controller: &mut StepController, target: Step) {
    while controller.active_step() < target {
        match controller.active_step() {
            Step::Upload => {
                if controller.state().uploaded_files.is_empty() {
                    controller
                        .upload_files(vec![FileDescriptor::new(
                            "brief.pdf",
                            48_213,
                            "application/pdf",
                        )])
                        .unwrap();
                }
                generate(controller, Step::Upload).await;
            }
            Step::Motivations => {
                controller.confirm_brief().unwrap();
                generate(controller, Step::Motivations).await;
                controller
                    .select(SelectionKind::Motivations, vec!["m1".to_string()])
                    .unwrap();
            }
            Step::Copy => generate(controller, Step::Copy).await,
            Step::Assets => {
                generate(controller, Step::Assets).await;
                controller
                    .select(SelectionKind::Assets, vec!["a1".to_string()])
                    .unwrap();
            }
            Step::Templates => {
                generate(controller, Step::Templates).await;
                controller
                    .select(SelectionKind::Templates, vec!["t1".to_string()])
                    .unwrap();
            }
            Step::Matrix => generate(controller, Step::Matrix).await,
            Step::Ready => break,
        }
        controller.advance().unwrap();
    }
}

/// A record as another context would have written it
pub fn record_at(step: Step, epoch: u32) -> WorkflowState {
    let mut state = WorkflowState::fresh(epoch);
    state.active_step = step;
    state.touch();
    state
}
