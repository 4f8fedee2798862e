use crate::models::Step;
use crate::workflow::{StepController, WorkflowEvent};
use crate::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Run the generation call of `step` (default: the active step) and wait for it
pub async fn run(
    project_root: &Path,
    step: Option<u8>,
    text: Option<String>,
    retries: u32,
) -> Result<()> {
    let mut controller = super::open_session(project_root)?;
    let step = match step {
        Some(index) => Step::from_index(index)
            .ok_or_else(|| anyhow::anyhow!("Step must be between 0 and 6, got {}", index))?,
        None => controller.active_step(),
    };

    let handle = match text {
        Some(text) if step == Step::Upload => controller.parse_brief_text(text)?,
        Some(_) => anyhow::bail!("--text only applies to brief parsing (step 0)"),
        None => controller.request_generation(step)?,
    };

    let spinner = spinner(format!("Running {}...", handle.call));
    let result = wait_for(&mut controller, step, retries, &spinner).await;
    spinner.finish_and_clear();
    result?;

    println!("{}", format!("✅ {} finished", handle.call).green());
    super::status::print_step_data(controller.state(), step);
    Ok(())
}

/// Drive the controller until `step`'s generation settles, retrying failures
pub async fn wait_for(
    controller: &mut StepController,
    step: Step,
    mut retries: u32,
    spinner: &ProgressBar,
) -> Result<()> {
    loop {
        let Some(event) = controller.next_generation_event().await else {
            anyhow::bail!("Generation for step {} is no longer running", step);
        };

        match event {
            WorkflowEvent::GenerationSucceeded { step: settled, .. } if settled == step => {
                return Ok(());
            }
            WorkflowEvent::GenerationFailed {
                step: settled,
                error,
            } if settled == step => {
                if retries == 0 {
                    return Err(error.into());
                }
                retries -= 1;
                spinner.println(format!("   {} {}, retrying", "⚠️".yellow(), error));
                controller.retry_generation(step)?;
            }
            _ => {}
        }
    }
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
