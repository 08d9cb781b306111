// CLI subcommand dispatch.

use std::fs;
use std::path::Path;

use anyhow::Context;
use clap::Subcommand;
use serde::de::DeserializeOwned;

pub mod check;
pub mod replay;
pub mod validate;

#[derive(Subcommand)]
pub enum Command {
    /// Validate a command envelope and list every violation
    Validate(validate::ValidateArgs),
    /// Run the structural invariant sweep over a project snapshot
    Check(check::CheckArgs),
    /// Fold a committed-event log into a project projection
    Replay(replay::ReplayArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Validate(args) => validate::run(args),
        Command::Check(args) => check::run(args),
        Command::Replay(args) => replay::run(args),
    }
}

/// Reads and parses a JSON document from disk.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}
