//! taskbind - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use taskbind::demo::{self, DemoTasks};
use taskbind::util::{config::BindingConfig, logger};
use taskbind::worker::{self, WorkerArgs};
use taskbind::{NAME, VERSION};

/// Client-side binding for a distributed task runtime
#[derive(Parser, Debug)]
#[command(name = "taskbind")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one task of the built-in registry (runtime worker contract)
    Worker(WorkerArgs),

    /// Run the demo scenarios on the local runtime
    Demo {
        /// Configuration file (defaults to taskbind.toml when present)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if args.verbose {
        eprintln!("taskbind version: {}", VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match args.command {
        Commands::Worker(worker_args) => {
            let registry = DemoTasks::new()
                .context("Failed to declare demo tasks")?
                .registry();
            return Ok(worker::main_entry(worker_args, registry));
        }
        Commands::Demo { config } => {
            let config = BindingConfig::load(config.as_deref())
                .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
            logger::init_with_level(if args.verbose {
                logger::LogLevel::Debug
            } else {
                config.log_level
            });
            for (label, value) in demo::run(config).context("Demo failed")? {
                println!("{} = {:?}", label, value);
            }
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(ExitCode::SUCCESS)
}
