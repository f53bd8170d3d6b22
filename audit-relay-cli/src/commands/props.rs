use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use audit_relay::properties::{update_property, PropertyCache};
use clap::Subcommand;
use colored::Colorize;

use crate::utils;

#[derive(Subcommand)]
pub enum PropsCommands {
    /// Print the value of a key
    Get {
        /// Property file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Property key
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// Replace a key in place, or append it when absent
    Set {
        /// Property file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Property key
        #[arg(value_name = "KEY")]
        key: String,

        /// New value
        #[arg(value_name = "VALUE")]
        value: String,
    },
    /// List every property, sorted by key
    List {
        /// Property file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub fn execute(command: PropsCommands) -> Result<()> {
    match command {
        PropsCommands::Get { file, key } => get(&file, &key),
        PropsCommands::Set { file, key, value } => set(&file, &key, &value),
        PropsCommands::List { file } => list(&file),
    }
}

fn load(file: &Path) -> Result<PropertyCache> {
    PropertyCache::load(file)
        .with_context(|| format!("Failed to load properties from {}", file.display()))
}

fn get(file: &Path, key: &str) -> Result<()> {
    let cache = load(file)?;
    match cache.get(key) {
        Some(value) => {
            println!("{}", value);
            Ok(())
        }
        None => anyhow::bail!("Key '{}' not found in {}", key, file.display()),
    }
}

fn set(file: &Path, key: &str, value: &str) -> Result<()> {
    update_property(file, key, value)
        .with_context(|| format!("Failed to update {} in {}", key, file.display()))?;

    utils::success(&format!("{}={} written to {}", key, value, file.display()));
    Ok(())
}

fn list(file: &Path) -> Result<()> {
    let cache = load(file)?;

    if cache.is_empty() {
        utils::warning(&format!("No properties in {}", file.display()));
        return Ok(());
    }

    for (key, value) in cache.snapshot() {
        println!("{}={}", key.cyan(), value);
    }
    Ok(())
}
