use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod utils;

use commands::props::PropsCommands;

/// relay - inspect and update audit-relay configuration
#[derive(Parser)]
#[command(name = "relay")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read and update property files
    Props {
        #[command(subcommand)]
        command: PropsCommands,
    },
    /// Resolve broker settings from a .properties or .toml file
    Check {
        /// Configuration file
        #[arg(value_name = "FILE")]
        file: std::path::PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Props { command } => commands::props::execute(command),
        Commands::Check { file } => commands::check::execute(&file),
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);

            if let Some(source) = e.source() {
                eprintln!("\n{} {}", "Caused by:".yellow(), source);
            }

            std::process::exit(1);
        }
    }
}
