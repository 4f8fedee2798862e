//! GenerationTaskRunner - one in-flight generation task per step
//!
//! Tasks run on the tokio runtime and report back through a channel. The
//! runner only changes slot state when the owner drains completions, so all
//! merging happens on the caller's side of the event loop.

use super::{dispatch, ContentGenerator, GenerationCall, GenerationInput, GenerationOutput};
use crate::models::{Step, TimeoutConfig};
use crate::workflow::GenerationError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Identifies one started generation task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub step: Step,
    pub call: GenerationCall,
    pub id: u64,
}

/// Observable lifecycle of a step's generation task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Idle,
    Pending(TaskHandle),
    Succeeded(GenerationOutput),
    Failed(GenerationError),
}

/// Settled task reported by the runner
#[derive(Debug, Clone)]
pub struct Completion {
    pub handle: TaskHandle,
    pub outcome: Result<GenerationOutput, GenerationError>,
}

enum Slot {
    Pending {
        handle: TaskHandle,
        input: GenerationInput,
        task: JoinHandle<()>,
    },
    Succeeded {
        input: GenerationInput,
        output: GenerationOutput,
    },
    Failed {
        input: GenerationInput,
        error: GenerationError,
    },
}

/// Runs generation calls, at most one in flight per step
pub struct GenerationTaskRunner {
    generator: Arc<dyn ContentGenerator>,
    timeouts: TimeoutConfig,
    slots: HashMap<Step, Slot>,
    next_id: u64,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl GenerationTaskRunner {
    pub fn new(generator: Arc<dyn ContentGenerator>, timeouts: TimeoutConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            generator,
            timeouts,
            slots: HashMap::new(),
            next_id: 1,
            tx,
            rx,
        }
    }

    /// Start a task for `step`.
    ///
    /// If a task for the step is already pending this is a no-op that returns
    /// the existing handle. Must be called from within a tokio runtime.
    pub fn start(&mut self, step: Step, input: GenerationInput) -> TaskHandle {
        if let Some(Slot::Pending { handle, .. }) = self.slots.get(&step) {
            debug!(step = step.index(), task = handle.id, "generation already pending, reusing handle");
            return *handle;
        }

        let call = input.call();
        let handle = TaskHandle {
            step,
            call,
            id: self.next_id,
        };
        self.next_id += 1;

        let window = self.timeouts.window(call);
        let generator = Arc::clone(&self.generator);
        let tx = self.tx.clone();
        let task_input = input.clone();

        let task = tokio::spawn(async move {
            let outcome =
                match tokio::time::timeout(window, dispatch(generator.as_ref(), &task_input)).await {
                    Ok(result) => result,
                    Err(_) => Err(GenerationError::Timeout {
                        call,
                        after: window,
                    }),
                };
            // Receiver lives as long as the runner; a closed channel means nobody cares
            let _ = tx.send(Completion { handle, outcome });
        });

        info!(step = step.index(), task = handle.id, %call, timeout_secs = window.as_secs(), "generation started");
        self.slots.insert(step, Slot::Pending { handle, input, task });
        handle
    }

    /// Cancel the step's task. Returns true if a pending task was aborted.
    pub fn cancel(&mut self, step: Step) -> bool {
        match self.slots.remove(&step) {
            Some(Slot::Pending { handle, task, .. }) => {
                task.abort();
                info!(step = step.index(), task = handle.id, call = %handle.call, "generation cancelled");
                true
            }
            _ => false,
        }
    }

    /// Cancel every pending task and forget settled results
    pub fn cancel_all(&mut self) -> Vec<Step> {
        let steps: Vec<Step> = self.slots.keys().copied().collect();
        let cancelled: Vec<Step> = steps.into_iter().filter(|step| self.cancel(*step)).collect();
        self.slots.clear();
        cancelled
    }

    pub fn status(&self, step: Step) -> TaskStatus {
        match self.slots.get(&step) {
            None => TaskStatus::Idle,
            Some(Slot::Pending { handle, .. }) => TaskStatus::Pending(*handle),
            Some(Slot::Succeeded { output, .. }) => TaskStatus::Succeeded(output.clone()),
            Some(Slot::Failed { error, .. }) => TaskStatus::Failed(error.clone()),
        }
    }

    pub fn is_pending(&self, step: Step) -> bool {
        matches!(self.slots.get(&step), Some(Slot::Pending { .. }))
    }

    pub fn has_pending(&self) -> bool {
        self.slots
            .values()
            .any(|slot| matches!(slot, Slot::Pending { .. }))
    }

    /// Re-run a failed task with the same input
    pub fn retry(&mut self, step: Step) -> Option<TaskHandle> {
        let input = match self.slots.get(&step) {
            Some(Slot::Failed { input, error }) => {
                debug!(step = step.index(), %error, "retrying failed generation");
                input.clone()
            }
            _ => return None,
        };
        self.slots.remove(&step);
        Some(self.start(step, input))
    }

    /// Hand over a successful result; the slot returns to Idle
    pub fn take_result(&mut self, step: Step) -> Option<GenerationOutput> {
        match self.slots.remove(&step) {
            Some(Slot::Succeeded { output, .. }) => Some(output),
            Some(other) => {
                self.slots.insert(step, other);
                None
            }
            None => None,
        }
    }

    /// Input of the step's current or last task
    pub fn input(&self, step: Step) -> Option<&GenerationInput> {
        match self.slots.get(&step)? {
            Slot::Pending { input, .. } | Slot::Succeeded { input, .. } | Slot::Failed { input, .. } => {
                Some(input)
            }
        }
    }

    /// Wait for the next pending task to settle.
    ///
    /// Returns `None` immediately when nothing is pending.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        while self.has_pending() {
            let completion = self.rx.recv().await?;
            if let Some(settled) = self.settle(completion) {
                return Some(settled);
            }
        }
        None
    }

    /// Drain completions that already arrived without waiting
    pub fn poll_completions(&mut self) -> Vec<Completion> {
        let mut settled = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            if let Some(completion) = self.settle(completion) {
                settled.push(completion);
            }
        }
        settled
    }

    fn settle(&mut self, completion: Completion) -> Option<Completion> {
        let step = completion.handle.step;
        let current = match self.slots.get(&step) {
            Some(Slot::Pending { handle, .. }) => Some(*handle),
            _ => None,
        };
        if current != Some(completion.handle) {
            debug!(step = step.index(), task = completion.handle.id, "discarding stale generation result");
            return None;
        }

        let Some(Slot::Pending { input, .. }) = self.slots.remove(&step) else {
            return None;
        };

        let slot = match &completion.outcome {
            Ok(output) => {
                info!(step = step.index(), task = completion.handle.id, call = %completion.handle.call, "generation succeeded");
                Slot::Succeeded {
                    input,
                    output: output.clone(),
                }
            }
            Err(error) => {
                warn!(step = step.index(), task = completion.handle.id, %error, "generation failed");
                Slot::Failed {
                    input,
                    error: error.clone(),
                }
            }
        };
        self.slots.insert(step, slot);
        Some(completion)
    }
}

impl Drop for GenerationTaskRunner {
    fn drop(&mut self) {
        for slot in self.slots.values() {
            if let Slot::Pending { task, .. } = slot {
                task.abort();
            }
        }
    }
}
