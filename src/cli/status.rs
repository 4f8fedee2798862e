use crate::models::{SelectionKind, Step, WorkflowState};
use crate::workflow::StepController;
use crate::Result;
use colored::Colorize;
use std::path::Path;

pub fn run(project_root: &Path, json: bool) -> Result<()> {
    let controller = super::open_session(project_root)?;

    if json {
        let blocked = controller.can_advance().err().map(|e| e.to_string());
        let report = serde_json::json!({
            "activeStep": controller.active_step().index(),
            "label": controller.active_step().label(),
            "degraded": controller.is_degraded() || controller.is_detached(),
            "advanceBlockedBy": blocked,
            "state": controller.state(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_status(&controller);
    Ok(())
}

pub fn print_status(controller: &StepController) {
    let state = controller.state();
    let active = state.active_step;

    println!("{}", "Workflow status".cyan().bold());
    println!();

    for step in Step::ALL {
        let line = format!("{}", step);
        if step < active {
            println!("   {} {}", "✓".green(), line.bright_black());
        } else if step == active {
            println!("   {} {}", "▶".cyan(), line.bold());
        } else {
            println!("   {} {}", "·".bright_black(), line.bright_black());
        }
    }
    println!();

    print_step_data(state, active);

    if !active.is_terminal() {
        match controller.can_advance() {
            Ok(next) => println!("   Next:      {} ({})", "briefflow advance".cyan(), next.label()),
            Err(reason) => println!("   Blocked:   {}", reason.to_string().yellow()),
        }
    }

    println!("   Updated:   {}", state.updated_at.format("%Y-%m-%d %H:%M:%S"));
    if controller.is_degraded() || controller.is_detached() {
        println!("   {}", "Storage unavailable, progress is not being saved".yellow());
    }
}

/// Summary of the data owned by `step`
pub fn print_step_data(state: &WorkflowState, step: Step) {
    match step {
        Step::Upload => {
            if state.uploaded_files.is_empty() {
                println!("   Files:     {}", "none".bright_black());
            }
            for file in &state.uploaded_files {
                println!("   File:      {} ({}, {} bytes)", file.name, file.mime_type, file.size);
            }
            match &state.brief_data {
                Some(brief) => println!("   Brief:     {}", brief.objective),
                None => println!("   Brief:     {}", "not parsed".bright_black()),
            }
        }
        Step::Motivations => {
            let confirmed = if state.brief_confirmed {
                "confirmed".green()
            } else {
                "not confirmed".yellow()
            };
            println!("   Brief:     {}", confirmed);
            for m in &state.motivations {
                let mark = selection_mark(state, SelectionKind::Motivations, &m.id);
                println!("   {} {:<10} {:.2}  {}", mark, m.id, m.score, m.title);
            }
        }
        Step::Copy => {
            for copy in state.selected_copy() {
                println!("   {} [{}] {}", copy.id.cyan(), copy.motivation_id, copy.text);
            }
        }
        Step::Assets => {
            for asset in &state.asset_candidates {
                let mark = selection_mark(state, SelectionKind::Assets, &asset.id);
                println!("   {} {:<10} {}", mark, asset.id, asset.name);
            }
        }
        Step::Templates => {
            for template in &state.template_candidates {
                let mark = selection_mark(state, SelectionKind::Templates, &template.id);
                println!("   {} {:<10} {}", mark, template.id, template.name);
            }
        }
        Step::Matrix | Step::Ready => match &state.content_matrix {
            Some(matrix) => {
                println!("   Matrix:    {} combinations", matrix.cells.len());
                for cell in &matrix.cells {
                    println!("   {} × {} × {}", cell.copy_id, cell.asset_id, cell.template_id);
                }
            }
            None => println!("   Matrix:    {}", "not built".bright_black()),
        },
    }
}

fn selection_mark(state: &WorkflowState, kind: SelectionKind, id: &str) -> colored::ColoredString {
    if state.selection(kind).contains(id) {
        "[x]".green()
    } else {
        "[ ]".bright_black()
    }
}
