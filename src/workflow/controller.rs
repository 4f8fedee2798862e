//! StepController - the workflow state machine
//!
//! Every mutation of the workflow record goes through here. Transitions are
//! validated against the [`StepRegistry`], persisted immediately, checked by
//! the [`ResetGuard`], and reported to observers.

use super::{
    EventLog, GenerationError, GuardMode, GuardVerdict, ResetGuard, SessionOrigin, StepRegistry,
    TransitionCause, ValidationError, WorkflowError, WorkflowEvent, WorkflowObserver,
};
use crate::models::{
    FileDescriptor, FlowConfig, SelectionKind, Step, TimeoutConfig, WorkflowState,
};
use crate::orchestrator::{
    Completion, ContentGenerator, GenerationCall, GenerationInput, GenerationOutput,
    GenerationTaskRunner, TaskHandle, TaskStatus,
};
use crate::state::{LoadOutcome, PersistedStore};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of re-reading the shared record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The store holds what we last wrote or read
    UpToDate,
    /// Another context's record was adopted
    Adopted { from: Step, to: Step },
    /// The store holds no usable record; ours was written back
    Reattached,
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a controller and loads the session
pub struct ControllerBuilder {
    store: Arc<dyn PersistedStore>,
    generator: Arc<dyn ContentGenerator>,
    registry: StepRegistry,
    guard_mode: GuardMode,
    timeouts: TimeoutConfig,
    retain_on_complete: bool,
    observers: Vec<Box<dyn WorkflowObserver>>,
}

impl ControllerBuilder {
    /// Apply guard mode, timeouts and retention policy from config
    pub fn config(mut self, config: &FlowConfig) -> Self {
        self.guard_mode = config.guard.mode;
        self.timeouts = config.timeouts.clone();
        self.retain_on_complete = config.storage.retain_on_complete;
        self
    }

    pub fn observer(mut self, observer: impl WorkflowObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Load the saved session (or start fresh) and return the controller
    pub fn open(self) -> StepController {
        let outcome = self.store.load_detailed();
        let scope = self.store.scope();

        let (state, origin) = match outcome {
            LoadOutcome::Restored(state) => {
                info!(%scope, step = state.active_step.index(), "restored saved workflow session");
                (state, SessionOrigin::Restored)
            }
            LoadOutcome::Empty => {
                info!(%scope, "no saved workflow session, starting at step 0");
                (WorkflowState::fresh(0), SessionOrigin::Fresh)
            }
            LoadOutcome::Discarded(reason) => {
                if matches!(reason, WorkflowError::SchemaMismatch { .. }) {
                    info!(%scope, %reason, "saved session predates current schema, starting fresh");
                } else {
                    warn!(%scope, %reason, "saved session unreadable, starting fresh");
                }
                (
                    WorkflowState::fresh(0),
                    SessionOrigin::Discarded {
                        reason: reason.to_string(),
                    },
                )
            }
            LoadOutcome::Unavailable(error) => {
                // Not a reset: treated as "no saved session" and kept off the store
                warn!(%scope, %error, "storage unavailable on startup, session runs in memory");
                (
                    WorkflowState::fresh(0),
                    SessionOrigin::StorageUnavailable {
                        error: error.to_string(),
                    },
                )
            }
        };

        let restored = origin == SessionOrigin::Restored;
        let detached = matches!(origin, SessionOrigin::StorageUnavailable { .. });

        if matches!(origin, SessionOrigin::Discarded { .. }) {
            if let Err(e) = self.store.clear() {
                warn!(%scope, error = %e, "failed to remove discarded session record");
            }
        }

        let mut controller = StepController {
            registry: self.registry,
            store: self.store,
            runner: GenerationTaskRunner::new(self.generator, self.timeouts),
            guard: ResetGuard::new(self.guard_mode),
            high_water: state.active_step,
            last_known: restored.then_some(state.updated_at),
            state,
            degraded: detached,
            detached,
            retain_on_complete: self.retain_on_complete,
            observers: self.observers,
        };

        controller
            .guard
            .observe(&controller.state, TransitionCause::SessionStart);
        if !restored {
            controller.persist();
        }
        controller.emit(WorkflowEvent::SessionStarted {
            step: controller.state.active_step,
            origin,
        });
        controller
    }
}

// =============================================================================
// StepController
// =============================================================================

/// The workflow state machine
pub struct StepController {
    registry: StepRegistry,
    store: Arc<dyn PersistedStore>,
    runner: GenerationTaskRunner,
    guard: ResetGuard,
    state: WorkflowState,
    /// `updatedAt` of the last record we wrote to or read from the store
    last_known: Option<DateTime<Utc>>,
    high_water: Step,
    degraded: bool,
    /// Startup load failed; writes wait until the store is readable again
    detached: bool,
    retain_on_complete: bool,
    observers: Vec<Box<dyn WorkflowObserver>>,
}

impl StepController {
    pub fn builder(
        store: Arc<dyn PersistedStore>,
        generator: Arc<dyn ContentGenerator>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            store,
            generator,
            registry: StepRegistry::standard(),
            guard_mode: GuardMode::default(),
            timeouts: TimeoutConfig::default(),
            retain_on_complete: false,
            observers: Vec::new(),
        }
    }

    /// Open with defaults plus an event log
    pub fn open_logged(
        store: Arc<dyn PersistedStore>,
        generator: Arc<dyn ContentGenerator>,
        config: &FlowConfig,
    ) -> (Self, EventLog) {
        let log = EventLog::new();
        let controller = Self::builder(store, generator)
            .config(config)
            .observer(log.clone())
            .open();
        (controller, log)
    }

    pub fn subscribe(&mut self, observer: impl WorkflowObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn active_step(&self) -> Step {
        self.state.active_step
    }

    /// Highest step reached in this session
    pub fn high_water(&self) -> Step {
        self.high_water
    }

    /// A save failed and the session currently lives only in memory
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Startup could not read the store; writes are suspended until a sync
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn anomalies(&self) -> &[super::AnomalyRecord] {
        self.guard.anomalies()
    }

    pub fn generation_status(&self, step: Step) -> TaskStatus {
        self.runner.status(step)
    }

    /// Whether `advance()` would currently succeed
    pub fn can_advance(&self) -> Result<Step, ValidationError> {
        let to = self
            .state
            .active_step
            .next()
            .ok_or(ValidationError::AtTerminalStep)?;
        self.registry.check_entry(to, &self.state)?;
        Ok(to)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Move to the next step if its precondition holds
    pub fn advance(&mut self) -> Result<Step, WorkflowError> {
        let from = self.state.active_step;
        let to = match self.can_advance() {
            Ok(to) => to,
            Err(e) => {
                debug!(from = from.index(), error = %e, "advance refused");
                return Err(e.into());
            }
        };

        self.state.active_step = to;
        self.transition(from, to, TransitionCause::Advance);
        Ok(to)
    }

    /// Step back one step; downstream data is kept
    pub fn retreat(&mut self) -> Result<Step, WorkflowError> {
        let from = self.state.active_step;
        let to = from.previous().ok_or(ValidationError::AtFirstStep)?;

        for step in Step::ALL.into_iter().filter(|s| *s > to) {
            self.cancel_generation(step);
        }

        self.state.active_step = to;
        self.transition(from, to, TransitionCause::Retreat);
        Ok(to)
    }

    /// Explicit "start over": cancel work, discard everything, back to step 0
    pub fn reset_to_start(&mut self) {
        let from = self.state.active_step;

        for step in self.runner.cancel_all() {
            self.emit(WorkflowEvent::GenerationCancelled { step });
        }

        // A detached session never saw the stored record, so it is left alone
        if !self.detached {
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "failed to clear persisted session during reset");
            }
            self.last_known = None;
        }

        self.state = WorkflowState::fresh(self.state.reset_epoch + 1);
        self.high_water = Step::Upload;
        info!(from = from.index(), epoch = self.state.reset_epoch, "workflow reset to start");
        self.emit(WorkflowEvent::SessionCleared);
        self.transition(from, Step::Upload, TransitionCause::ExplicitReset);
    }

    /// Navigating away: drop the current step's in-flight generation
    pub fn suspend(&mut self) {
        let step = self.state.active_step;
        if self.cancel_generation(step) {
            debug!(step = step.index(), "suspended with generation in flight");
        }
    }

    /// Dispatch the render at the terminal step.
    ///
    /// Unlike every other save, a storage failure here is returned to the
    /// caller since the finished output would otherwise be lost.
    pub fn finish(&mut self) -> Result<(), WorkflowError> {
        self.require_step("finish", Step::Ready, |active| active == Step::Ready)?;
        self.registry.check_entry(Step::Ready, &self.state)?;

        self.state.touch();
        let report = self.store.save_checked(&self.state, self.last_known)?;
        if let Some(conflict) = report.conflict {
            warn!(stored_at = %conflict.stored_at, "overwrote newer record from another context");
            self.emit(WorkflowEvent::ConflictDetected(conflict));
        }
        self.last_known = Some(self.state.updated_at);
        self.degraded = false;
        self.detached = false;

        info!(cells = self.state.content_matrix.as_ref().map_or(0, |m| m.cells.len()), "render dispatched");
        self.emit(WorkflowEvent::RenderDispatched);

        if !self.retain_on_complete {
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "failed to clear completed session");
            }
            self.last_known = None;
            let from = self.state.active_step;
            self.state = WorkflowState::fresh(self.state.reset_epoch + 1);
            self.high_water = Step::Upload;
            self.emit(WorkflowEvent::SessionCleared);
            self.guard.observe(&self.state, TransitionCause::ExplicitReset);
            self.emit(WorkflowEvent::StepChanged {
                from,
                to: Step::Upload,
                cause: TransitionCause::ExplicitReset,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Step data
    // =========================================================================

    /// Add brief files at the upload step; any previous parse is invalidated
    pub fn upload_files(&mut self, files: Vec<FileDescriptor>) -> Result<(), WorkflowError> {
        self.require_step("upload", Step::Upload, |active| active == Step::Upload)?;
        if files.is_empty() {
            return Err(ValidationError::NoFiles.into());
        }

        self.state.uploaded_files.extend(files);
        self.state.brief_data = None;
        self.state.brief_confirmed = false;
        self.data_changed(Step::Upload, "uploaded files");
        Ok(())
    }

    /// Accept the parsed brief
    pub fn confirm_brief(&mut self) -> Result<(), WorkflowError> {
        self.require_step("confirm brief", Step::Motivations, |active| {
            active >= Step::Motivations
        })?;
        if self.state.brief_data.is_none() {
            return Err(ValidationError::PreconditionFailed {
                step: Step::Motivations,
                reason: "brief has not been parsed".to_string(),
            }
            .into());
        }
        if !self.state.brief_confirmed {
            self.state.brief_confirmed = true;
            self.data_changed(Step::Motivations, "brief confirmed");
        }
        Ok(())
    }

    /// Replace a selection. Ids must exist; an empty selection is allowed
    /// but blocks `advance()` from that step.
    pub fn select(
        &mut self,
        kind: SelectionKind,
        ids: impl IntoIterator<Item = String>,
    ) -> Result<(), WorkflowError> {
        let step = kind.step();
        self.require_step("select", step, |active| active == step)?;

        let ids: BTreeSet<String> = ids.into_iter().collect();
        let available = self.state.available_ids(kind);
        if let Some(unknown) = ids.iter().find(|id| !available.contains(id.as_str())) {
            return Err(ValidationError::UnknownId {
                kind,
                id: unknown.clone(),
            }
            .into());
        }

        if self.state.selection(kind) == &ids {
            return Ok(());
        }

        *self.state.selection_mut(kind) = ids;
        // Upstream selection changed, the assembled matrix is stale
        self.state.content_matrix = None;
        self.prune();
        self.data_changed(step, "selection");
        Ok(())
    }

    /// Drop one motivation candidate; a selection of it is pruned
    pub fn remove_motivation(&mut self, id: &str) -> Result<(), WorkflowError> {
        self.require_step("remove motivation", Step::Motivations, |active| {
            active == Step::Motivations
        })?;

        let before = self.state.motivations.len();
        self.state.motivations.retain(|m| m.id != id);
        if self.state.motivations.len() == before {
            return Err(ValidationError::UnknownId {
                kind: SelectionKind::Motivations,
                id: id.to_string(),
            }
            .into());
        }

        self.prune();
        self.data_changed(Step::Motivations, "motivation removed");
        Ok(())
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Start (or rejoin) the generation call of `step`
    pub fn request_generation(&mut self, step: Step) -> Result<TaskHandle, WorkflowError> {
        let input = self.generation_input(step)?;
        Ok(self.start_generation(step, input))
    }

    /// Parse a brief given as text instead of (or in addition to) files
    pub fn parse_brief_text(&mut self, text: impl Into<String>) -> Result<TaskHandle, WorkflowError> {
        let input = GenerationInput::ParseBrief {
            files: self.state.uploaded_files.clone(),
            text: Some(text.into()),
        };
        Ok(self.start_generation(Step::Upload, input))
    }

    /// Re-run a failed generation with its original input
    pub fn retry_generation(&mut self, step: Step) -> Result<TaskHandle, WorkflowError> {
        let handle = self
            .runner
            .retry(step)
            .ok_or(ValidationError::NothingToRetry { step })?;
        self.emit(WorkflowEvent::GenerationStarted(handle));
        Ok(handle)
    }

    /// Cancel the step's in-flight generation; true if one was running
    pub fn cancel_generation(&mut self, step: Step) -> bool {
        let cancelled = self.runner.cancel(step);
        if cancelled {
            self.emit(WorkflowEvent::GenerationCancelled { step });
        }
        cancelled
    }

    /// Merge a generation result into the record. The active step is not
    /// changed; an explicit `advance()` is still required.
    pub fn apply_generation_result(
        &mut self,
        step: Step,
        output: GenerationOutput,
    ) -> Result<(), WorkflowError> {
        let expected = self
            .registry
            .generation_call(step)
            .ok_or(ValidationError::NoGenerationCall { step })?;
        let call = output.call();
        if call != expected {
            return Err(ValidationError::MismatchedResult { call, expected }.into());
        }
        self.require_reached(call)?;

        match output {
            GenerationOutput::Brief(brief) => {
                self.state.brief_data = Some(brief);
                self.state.brief_confirmed = false;
            }
            GenerationOutput::Motivations(motivations) => {
                self.state.motivations = motivations;
            }
            GenerationOutput::Copy(copy) => {
                self.state.copy_variations = copy;
            }
            GenerationOutput::Assets(assets) => {
                self.state.asset_candidates = assets;
            }
            GenerationOutput::Templates(templates) => {
                self.state.template_candidates = templates;
            }
            GenerationOutput::Matrix(matrix) => {
                let previous = self.state.content_matrix.replace(matrix);
                if !self.state.matrix_is_well_formed() {
                    self.state.content_matrix = previous;
                    return Err(GenerationError::Malformed {
                        call,
                        message: "matrix references items outside the current selections"
                            .to_string(),
                    }
                    .into());
                }
            }
        }

        self.prune();
        self.state.touch();
        self.persist();
        info!(step = step.index(), %call, "generation result applied");
        self.emit(WorkflowEvent::GenerationSucceeded { step, call });
        Ok(())
    }

    /// Wait for the next in-flight generation to settle and merge it.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_generation_event(&mut self) -> Option<WorkflowEvent> {
        let completion = self.runner.next_completion().await?;
        Some(self.handle_completion(completion))
    }

    /// Merge every generation that already settled, without waiting
    pub fn process_ready_generations(&mut self) -> Vec<WorkflowEvent> {
        self.runner
            .poll_completions()
            .into_iter()
            .map(|completion| self.handle_completion(completion))
            .collect()
    }

    // =========================================================================
    // Cross-context sync
    // =========================================================================

    /// Re-read the shared record written by another context and adopt it.
    ///
    /// The incoming record passes through the reset guard; in strict mode an
    /// unexplained drop to step 0 is refused, our state is written back and
    /// `AnomalousReset` is returned.
    pub fn sync_from_store(&mut self) -> Result<SyncOutcome, WorkflowError> {
        let incoming = match self.store.load_detailed() {
            LoadOutcome::Restored(incoming) => incoming,
            LoadOutcome::Empty | LoadOutcome::Discarded(_) => {
                self.detached = false;
                self.state.touch();
                self.persist();
                return Ok(SyncOutcome::Reattached);
            }
            LoadOutcome::Unavailable(e) => return Err(e.into()),
        };
        self.detached = false;

        if self.last_known == Some(incoming.updated_at) {
            return Ok(SyncOutcome::UpToDate);
        }

        let from = self.state.active_step;
        let to = incoming.active_step;

        match self.guard.observe(&incoming, TransitionCause::StoreSync) {
            GuardVerdict::Revert(record) => {
                self.emit(WorkflowEvent::AnomalousReset(record));
                self.last_known = Some(incoming.updated_at);
                self.state.touch();
                self.persist();
                Err(WorkflowError::AnomalousReset { from })
            }
            verdict => {
                if let GuardVerdict::Flagged(record) = verdict {
                    self.emit(WorkflowEvent::AnomalousReset(record));
                }

                let epoch_advanced = incoming.reset_epoch > self.state.reset_epoch;
                if epoch_advanced {
                    for step in self.runner.cancel_all() {
                        self.emit(WorkflowEvent::GenerationCancelled { step });
                    }
                }
                self.high_water = if epoch_advanced {
                    to
                } else {
                    self.high_water.max(to)
                };

                self.last_known = Some(incoming.updated_at);
                self.state = incoming;
                // Store is readable and we hold its record
                self.degraded = false;
                info!(from = from.index(), to = to.index(), "adopted workflow record from another context");

                if from != to {
                    self.emit(WorkflowEvent::StepChanged {
                        from,
                        to,
                        cause: TransitionCause::StoreSync,
                    });
                } else {
                    self.emit(WorkflowEvent::DataChanged {
                        step: to,
                        what: "synced",
                    });
                }
                Ok(SyncOutcome::Adopted { from, to })
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn emit(&self, event: WorkflowEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    fn transition(&mut self, from: Step, to: Step, cause: TransitionCause) {
        self.state.touch();
        // Controller-originated transitions never silently land on step 0
        self.guard.observe(&self.state, cause);
        if cause != TransitionCause::ExplicitReset {
            self.high_water = self.high_water.max(to);
        }
        self.persist();
        info!(from = from.index(), to = to.index(), %cause, "workflow step changed");
        self.emit(WorkflowEvent::StepChanged { from, to, cause });
    }

    fn data_changed(&mut self, step: Step, what: &'static str) {
        self.state.touch();
        self.persist();
        debug!(step = step.index(), what, "workflow data changed");
        self.emit(WorkflowEvent::DataChanged { step, what });
    }

    fn prune(&mut self) {
        for pruned in self.state.prune_selections() {
            info!(kind = %pruned.kind, removed = ?pruned.removed, "pruned dangling selection");
            self.emit(WorkflowEvent::SelectionPruned(pruned));
        }
    }

    /// Save the record; failures degrade the session to in-memory
    fn persist(&mut self) {
        if self.detached {
            debug!("store detached, keeping change in memory");
            return;
        }

        match self.store.save_checked(&self.state, self.last_known) {
            Ok(report) => {
                if let Some(conflict) = report.conflict {
                    warn!(
                        stored_at = %conflict.stored_at,
                        known_at = ?conflict.known_at,
                        "overwrote newer record from another context"
                    );
                    self.emit(WorkflowEvent::ConflictDetected(conflict));
                }
                self.last_known = Some(self.state.updated_at);
                if self.degraded {
                    info!("storage recovered, session persisted again");
                    self.degraded = false;
                }
            }
            Err(error) => {
                warn!(%error, step = self.state.active_step.index(), "failed to persist workflow record, continuing in memory");
                self.degraded = true;
                self.emit(WorkflowEvent::StorageDegraded {
                    error: error.to_string(),
                });
            }
        }
    }

    fn require_step(
        &self,
        action: &'static str,
        expected: Step,
        allowed: impl Fn(Step) -> bool,
    ) -> Result<(), ValidationError> {
        let active = self.state.active_step;
        if allowed(active) {
            Ok(())
        } else {
            Err(ValidationError::WrongStep {
                action,
                expected,
                active,
            })
        }
    }

    fn require_reached(&self, call: GenerationCall) -> Result<(), ValidationError> {
        let required = call.step();
        let active = self.state.active_step;
        if active < required {
            return Err(ValidationError::StepNotReached {
                call,
                required,
                active,
            });
        }
        Ok(())
    }

    fn generation_input(&self, step: Step) -> Result<GenerationInput, ValidationError> {
        let call = self
            .registry
            .generation_call(step)
            .ok_or(ValidationError::NoGenerationCall { step })?;
        self.require_reached(call)?;
        self.registry.generation_input(step, &self.state)
    }

    fn start_generation(&mut self, step: Step, input: GenerationInput) -> TaskHandle {
        let already_pending = self.runner.is_pending(step);
        let handle = self.runner.start(step, input);
        if !already_pending {
            self.emit(WorkflowEvent::GenerationStarted(handle));
        }
        handle
    }

    fn handle_completion(&mut self, completion: Completion) -> WorkflowEvent {
        let step = completion.handle.step;
        match completion.outcome {
            Ok(_) => {
                let Some(output) = self.runner.take_result(step) else {
                    // Settled slot vanished; only possible if cancelled in between
                    return WorkflowEvent::GenerationCancelled { step };
                };
                match self.apply_generation_result(step, output) {
                    Ok(()) => WorkflowEvent::GenerationSucceeded {
                        step,
                        call: completion.handle.call,
                    },
                    Err(e) => {
                        warn!(step = step.index(), error = %e, "generation result could not be applied");
                        let error = match e {
                            WorkflowError::Generation(g) => g,
                            other => GenerationError::Malformed {
                                call: completion.handle.call,
                                message: other.to_string(),
                            },
                        };
                        let event = WorkflowEvent::GenerationFailed { step, error };
                        self.emit(event.clone());
                        event
                    }
                }
            }
            Err(error) => {
                let event = WorkflowEvent::GenerationFailed { step, error };
                self.emit(event.clone());
                event
            }
        }
    }
}

impl std::fmt::Debug for StepController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepController")
            .field("active_step", &self.state.active_step)
            .field("high_water", &self.high_water)
            .field("degraded", &self.degraded)
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}
