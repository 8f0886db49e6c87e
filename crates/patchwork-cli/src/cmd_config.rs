use clap::Subcommand;
use patchwork_ledger::WorkspacePaths;
use serde_json::Value;
use std::path::Path;

use crate::workspace::{read_config, write_config};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Set a config value
    Set {
        /// Config key (e.g. author, grouping, summary.endpoint)
        key: String,
        /// Config value (true/false/number/string)
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd, repo_root: &Path) -> anyhow::Result<()> {
    let paths = WorkspacePaths::discover(repo_root);
    if !paths.is_initialized() {
        anyhow::bail!("No .patchwork/ workspace found. Run `patchwork init` first.");
    }
    match cmd {
        ConfigCmd::Set { key, value } => set(&paths, &key, &value),
        ConfigCmd::Get { key } => get(&paths, &key),
        ConfigCmd::List => list(&paths),
    }
}

// ── Command Implementations ──

/// Parse a string value into a JSON bool, number or string.
fn parse_value(s: &str) -> Value {
    match s {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(n) = s.parse::<i64>() {
                Value::Number(n.into())
            } else if let Ok(f) = s.parse::<f64>() {
                serde_json::json!(f)
            } else {
                Value::String(s.to_string())
            }
        }
    }
}

fn set(paths: &WorkspacePaths, key: &str, value: &str) -> anyhow::Result<()> {
    let mut config = read_config(&paths.config_json)?;
    config.insert(key.to_string(), parse_value(value));
    write_config(&paths.config_json, &config)?;
    println!("{key} = {value}");
    Ok(())
}

fn get(paths: &WorkspacePaths, key: &str) -> anyhow::Result<()> {
    let config = read_config(&paths.config_json)?;
    match config.get(key) {
        Some(val) => println!("{val}"),
        None => println!("(not set)"),
    }
    Ok(())
}

fn list(paths: &WorkspacePaths) -> anyhow::Result<()> {
    let config = read_config(&paths.config_json)?;
    if config.is_empty() {
        println!("(no config set)");
    } else {
        for (k, v) in &config {
            println!("{k} = {v}");
        }
    }
    Ok(())
}
