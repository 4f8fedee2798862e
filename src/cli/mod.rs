//! Command-line front end
//!
//! Each command opens the session from disk, performs one operation through
//! the `StepController`, and exits. Generation commands wait for their task.

pub mod generate;
pub mod init;
pub mod navigate;
pub mod select;
pub mod status;
pub mod upload;

use crate::models::{FlowConfig, GeneratorKind};
use crate::orchestrator::{ContentGenerator, ScriptGenerator};
use crate::state::FileStore;
use crate::workflow::{SessionOrigin, StepController, WorkflowEvent, WorkflowObserver};
use crate::Result;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

/// Open the configured session for `project_root`
pub fn open_session(project_root: &Path) -> Result<StepController> {
    let config = FlowConfig::load(project_root)?;
    let store = Arc::new(FileStore::new(
        config.storage.resolve_dir(project_root),
        &config.storage.session,
    ));
    let generator = build_generator(&config, project_root)?;

    Ok(StepController::builder(store, generator)
        .config(&config)
        .observer(EventPrinter)
        .open())
}

/// Instantiate the collaborator named in `[generator]`
pub fn build_generator(
    config: &FlowConfig,
    project_root: &Path,
) -> Result<Arc<dyn ContentGenerator>> {
    match config.generator.kind {
        GeneratorKind::Script => Ok(Arc::new(
            ScriptGenerator::new(config.generator.commands.clone())
                .with_working_dir(project_root),
        )),
        GeneratorKind::Http => http_generator(config),
    }
}

#[cfg(feature = "api-direct")]
fn http_generator(config: &FlowConfig) -> Result<Arc<dyn ContentGenerator>> {
    let base_url = config
        .generator
        .base_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("[generator] kind = \"http\" requires base_url"))?;
    Ok(Arc::new(crate::orchestrator::HttpGenerator::new(base_url)))
}

#[cfg(not(feature = "api-direct"))]
fn http_generator(_: &FlowConfig) -> Result<Arc<dyn ContentGenerator>> {
    anyhow::bail!("HTTP generator requires building with the `api-direct` feature")
}

/// Prints warnings the user must see, regardless of log level
pub struct EventPrinter;

impl WorkflowObserver for EventPrinter {
    fn on_event(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::SessionStarted {
                origin: SessionOrigin::Discarded { reason },
                ..
            } => {
                eprintln!(
                    "{}",
                    format!("⚠️  Saved session was unusable and has been replaced: {}", reason).yellow()
                );
            }
            WorkflowEvent::SessionStarted {
                origin: SessionOrigin::StorageUnavailable { error },
                ..
            } => {
                eprintln!(
                    "{}",
                    format!("⚠️  Could not read saved session ({}); changes stay in memory", error).yellow()
                );
            }
            WorkflowEvent::StorageDegraded { error } => {
                eprintln!(
                    "{}",
                    format!("⚠️  Progress could not be saved: {}", error).yellow()
                );
            }
            WorkflowEvent::ConflictDetected(conflict) => {
                eprintln!(
                    "{}",
                    format!(
                        "⚠️  Another session wrote at {}; its changes were overwritten",
                        conflict.stored_at.format("%Y-%m-%d %H:%M:%S")
                    )
                    .yellow()
                );
            }
            WorkflowEvent::AnomalousReset(record) => {
                let action = if record.reverted { "refused" } else { "accepted" };
                eprintln!(
                    "{}",
                    format!(
                        "⛔ Unexpected reset from step {} ({}) {}",
                        record.from, record.cause, action
                    )
                    .red()
                );
            }
            WorkflowEvent::SelectionPruned(pruned) => {
                println!(
                    "   {} dropped {} no longer available: {}",
                    "•".bright_black(),
                    pruned.kind,
                    pruned.removed.join(", ")
                );
            }
            _ => {}
        }
    }
}
