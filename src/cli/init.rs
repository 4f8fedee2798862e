use crate::models::{FlowConfig, GeneratorKind, CONFIG_FILE};
use crate::Result;
use colored::Colorize;
use clap::ValueEnum;
use std::path::Path;
use uuid::Uuid;

/// Generator kind as named on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GeneratorArg {
    Script,
    Http,
}

impl From<GeneratorArg> for GeneratorKind {
    fn from(arg: GeneratorArg) -> Self {
        match arg {
            GeneratorArg::Script => GeneratorKind::Script,
            GeneratorArg::Http => GeneratorKind::Http,
        }
    }
}

/// Write `briefflow.toml` and create the storage directory
pub fn run(
    project_root: &Path,
    session: Option<&str>,
    generator: Option<GeneratorKind>,
    force: bool,
) -> Result<()> {
    let config_path = project_root.join(CONFIG_FILE);

    if config_path.exists() && !force {
        println!("{}", "⚠️  Briefflow is already initialized".yellow());
        println!("   Run with --force to rewrite {}", CONFIG_FILE);
        return Ok(());
    }

    let mut config = if config_path.exists() {
        FlowConfig::load(project_root)?
    } else {
        FlowConfig::default()
    };

    config.storage.session = match session {
        Some(name) => name.to_string(),
        None => new_session_id(),
    };
    if let Some(kind) = generator {
        config.generator.kind = kind;
    }

    let storage_dir = config.storage.resolve_dir(project_root);
    std::fs::create_dir_all(&storage_dir)?;
    config.save(project_root)?;

    println!("{}", "🚀 Briefflow initialized".green().bold());
    println!("   Config:  {}", config_path.display());
    println!("   Storage: {}", storage_dir.display());
    println!("   Session: {}", config.storage.session.cyan());
    println!();
    println!("Next: {}", "briefflow upload <brief-file>".cyan());

    Ok(())
}

/// Short random session scope
fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}
