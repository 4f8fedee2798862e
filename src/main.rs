use briefflow::cli::init::GeneratorArg;
use briefflow::cli::select::SelectArg;
use briefflow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "briefflow")]
#[command(author = "Chris Cheng <chris.cheng@shopee.com>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Campaign brief workflow: brief → motivations → copy → assets → templates → matrix → render", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Briefflow in current directory
    Init {
        /// Session name (a random id is generated if omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Generation backend
        #[arg(short, long, value_enum)]
        generator: Option<GeneratorArg>,

        /// Rewrite an existing briefflow.toml
        #[arg(short, long)]
        force: bool,
    },

    /// Show workflow progress
    Status {
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Upload brief files (step 0)
    Upload {
        /// Brief files (pdf, docx, txt, ...)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Run the generation call of a step and wait for the result
    Generate {
        /// Step index (defaults to the active step)
        #[arg(short, long)]
        step: Option<u8>,

        /// Parse this text as the brief instead of the uploaded files
        #[arg(short, long)]
        text: Option<String>,

        /// Retry a failed call up to this many times
        #[arg(short, long, default_value_t = 0)]
        retries: u32,
    },

    /// Confirm the parsed brief (step 1)
    #[command(name = "confirm-brief")]
    ConfirmBrief,

    /// Replace a selection with the given ids
    Select {
        /// What to select
        #[arg(value_enum)]
        kind: SelectArg,

        /// Ids to select (none clears the selection)
        ids: Vec<String>,
    },

    /// Remove a generated motivation
    #[command(name = "remove-motivation")]
    RemoveMotivation {
        /// Motivation id
        id: String,
    },

    /// Move to the next step
    Advance,

    /// Move back one step (data is kept)
    Back,

    /// Discard all progress and return to step 0
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Dispatch the render from the final step
    Finish,

    /// Re-read the saved session written by another process
    Sync,

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", format!("Error: failed to start runtime: {}", e).red());
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_async(cli)) {
        eprintln!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

async fn run_async(cli: Cli) -> Result<()> {
    let project_root = std::env::current_dir()?;

    match cli.command {
        Commands::Init {
            session,
            generator,
            force,
        } => {
            briefflow::cli::init::run(
                &project_root,
                session.as_deref(),
                generator.map(Into::into),
                force,
            )?;
        }

        Commands::Status { json } => {
            briefflow::cli::status::run(&project_root, json)?;
        }

        Commands::Upload { files } => {
            println!("{}", "📎 Uploading brief files...".cyan());
            briefflow::cli::upload::run(&project_root, &files)?;
        }

        Commands::Generate {
            step,
            text,
            retries,
        } => {
            briefflow::cli::generate::run(&project_root, step, text, retries).await?;
        }

        Commands::ConfirmBrief => {
            briefflow::cli::upload::confirm_brief(&project_root)?;
        }

        Commands::Select { kind, ids } => {
            briefflow::cli::select::run(&project_root, kind, ids)?;
        }

        Commands::RemoveMotivation { id } => {
            briefflow::cli::select::remove_motivation(&project_root, &id)?;
        }

        Commands::Advance => {
            briefflow::cli::navigate::advance(&project_root)?;
        }

        Commands::Back => {
            briefflow::cli::navigate::back(&project_root)?;
        }

        Commands::Reset { yes } => {
            briefflow::cli::navigate::reset(&project_root, yes)?;
        }

        Commands::Finish => {
            briefflow::cli::navigate::finish(&project_root)?;
        }

        Commands::Sync => {
            briefflow::cli::navigate::sync(&project_root)?;
        }

        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "briefflow", &mut io::stdout());
        }
    }

    Ok(())
}
