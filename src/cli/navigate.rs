use crate::models::Step;
use crate::workflow::SyncOutcome;
use crate::Result;
use colored::Colorize;
use dialoguer::Confirm;
use std::path::Path;

pub fn advance(project_root: &Path) -> Result<()> {
    let mut controller = super::open_session(project_root)?;
    let step = controller.advance()?;
    println!("{}", format!("▶ Now at step {}", step).cyan());
    if step == Step::Ready {
        println!("Next: {}", "briefflow finish".cyan());
    }
    Ok(())
}

pub fn back(project_root: &Path) -> Result<()> {
    let mut controller = super::open_session(project_root)?;
    let step = controller.retreat()?;
    println!("{}", format!("◀ Back at step {}", step).cyan());
    Ok(())
}

/// Discard the session and start over, after confirmation
pub fn reset(project_root: &Path, yes: bool) -> Result<()> {
    let mut controller = super::open_session(project_root)?;

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Discard all progress (currently at step {})?",
                controller.active_step()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    controller.reset_to_start();
    println!("{}", "🔄 Workflow reset to step 0".yellow());
    Ok(())
}

/// Dispatch the render from the terminal step
pub fn finish(project_root: &Path) -> Result<()> {
    let mut controller = super::open_session(project_root)?;
    let combinations = controller
        .state()
        .content_matrix
        .as_ref()
        .map_or(0, |m| m.cells.len());

    controller.finish()?;

    println!(
        "{}",
        format!("🎬 Render dispatched ({} combinations)", combinations)
            .green()
            .bold()
    );
    Ok(())
}

/// Re-read the shared record written by another process
pub fn sync(project_root: &Path) -> Result<()> {
    let mut controller = super::open_session(project_root)?;
    match controller.sync_from_store()? {
        SyncOutcome::UpToDate => println!("Already up to date"),
        SyncOutcome::Adopted { from, to } => {
            println!("✓ Adopted saved session (step {} → {})", from.index(), to.index())
        }
        SyncOutcome::Reattached => println!("✓ Storage reachable again, session saved"),
    }
    super::status::print_status(&controller);
    Ok(())
}
