use crate::models::SelectionKind;
use crate::Result;
use clap::ValueEnum;
use colored::Colorize;
use std::path::Path;

/// Selection kind as named on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SelectArg {
    Motivations,
    Assets,
    Templates,
}

impl From<SelectArg> for SelectionKind {
    fn from(arg: SelectArg) -> Self {
        match arg {
            SelectArg::Motivations => SelectionKind::Motivations,
            SelectArg::Assets => SelectionKind::Assets,
            SelectArg::Templates => SelectionKind::Templates,
        }
    }
}

/// Replace the selection of `kind` with `ids`
pub fn run(project_root: &Path, kind: SelectArg, ids: Vec<String>) -> Result<()> {
    let kind = SelectionKind::from(kind);
    let mut controller = super::open_session(project_root)?;
    controller.select(kind, ids)?;

    let selected = controller.state().selection(kind);
    if selected.is_empty() {
        println!("{}", format!("No {} selected", kind).yellow());
    } else {
        let ids: Vec<&str> = selected.iter().map(String::as_str).collect();
        println!("✓ Selected {}: {}", kind, ids.join(", ").cyan());
    }
    Ok(())
}

pub fn remove_motivation(project_root: &Path, id: &str) -> Result<()> {
    let mut controller = super::open_session(project_root)?;
    controller.remove_motivation(id)?;
    println!("✓ Removed motivation {}", id.cyan());
    Ok(())
}
