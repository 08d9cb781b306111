// `scenecraft validate`: check a command envelope, optionally against a snapshot.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use serde_json::Value;

use scenecraft_common::domain::{
    assert_invariants, process_command, validate_command, Command, DomainError, DomainEvent,
    ProjectState,
};

use super::read_json;
use crate::exit_code::RuleViolation;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to a command JSON file.
    pub command: PathBuf,

    /// Also check preconditions by applying the command to this snapshot.
    #[arg(long, value_name = "SNAPSHOT")]
    pub state: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReport {
    pub valid: bool,
    pub command_id: String,
    pub command_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// The event the command maps to, when it was applied to a snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<DomainEvent>,
}

pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match evaluate(&args) {
        Ok(report) => {
            output::print_output(format, &report, format_human)?;
            if report.valid {
                return Ok(());
            }
            Err(RuleViolation {
                code: report.code.clone().unwrap_or_default(),
                message: report.error.clone().unwrap_or_default(),
            }
            .into())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn evaluate(args: &ValidateArgs) -> anyhow::Result<ValidateReport> {
    let command: Command = read_json(&args.command)?;
    let state = match &args.state {
        Some(path) => {
            let state: ProjectState = read_json(path)?;
            assert_invariants(&state).map_err(|err| RuleViolation {
                code: "invalid_snapshot".into(),
                message: format!("{}: {err}", path.display()),
            })?;
            Some(state)
        }
        None => None,
    };
    Ok(check_command(&command, state.as_ref()))
}

/// Envelope and payload checks alone, or the full pipeline when `state` is given.
pub fn check_command(command: &Command, state: Option<&ProjectState>) -> ValidateReport {
    let outcome = match state {
        Some(state) => process_command(state, command).map(|processed| Some(processed.event)),
        None => validate_command(command).map(|_| None).map_err(DomainError::from),
    };

    let mut report = ValidateReport {
        valid: true,
        command_id: command.id.clone(),
        command_type: command.command_type.clone(),
        code: None,
        error: None,
        errors: Vec::new(),
        details: None,
        event: None,
    };
    match outcome {
        Ok(event) => report.event = event,
        Err(err) => {
            let details = err.details();
            report.valid = false;
            report.code = Some(err.code().to_string());
            report.error = Some(format!("{}: {err}", err.name()));
            report.errors = details
                .get("errors")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            if details.as_object().is_some_and(|map| !map.is_empty()) {
                report.details = Some(details);
            }
        }
    }
    report
}

fn format_human(report: &ValidateReport) -> String {
    let label = if report.command_id.is_empty() { "<no id>" } else { report.command_id.as_str() };
    if report.valid {
        let mut line = format!("ok {label} ({})", report.command_type);
        if let Some(event) = &report.event {
            line.push_str(&format!(" -> {}", event.event_type));
        }
        return line;
    }

    let mut lines = vec![format!(
        "invalid {label}: {}",
        report.error.as_deref().unwrap_or("rejected")
    )];
    for error in &report.errors {
        lines.push(format!("  - {error}"));
    }
    lines.join("\n")
}
