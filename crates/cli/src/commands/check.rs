// `scenecraft check`: run the invariant sweep over a project snapshot.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use serde_json::Value;

use scenecraft_common::domain::model::StateCounts;
use scenecraft_common::domain::{assert_invariants, ProjectState};

use super::read_json;
use crate::exit_code::RuleViolation;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Path to a project snapshot JSON file.
    pub snapshot: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub project_id: String,
    pub valid: bool,
    pub counts: StateCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match read_json::<ProjectState>(&args.snapshot) {
        Ok(state) => {
            let report = check_state(&state);
            output::print_output(format, &report, format_human)?;
            match report.error {
                None => Ok(()),
                Some(message) => Err(RuleViolation { code: "invariant_failed".into(), message }.into()),
            }
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

pub fn check_state(state: &ProjectState) -> CheckReport {
    let outcome = assert_invariants(state);
    CheckReport {
        project_id: state.project.id.clone(),
        valid: outcome.is_ok(),
        counts: state.counts(),
        error: outcome.as_ref().err().map(|err| err.message.clone()),
        details: outcome.err().map(|err| err.details),
    }
}

fn format_human(report: &CheckReport) -> String {
    let counts = &report.counts;
    let summary = format!(
        "{} scenes, {} sections, {} lines, {} resources, {} layouts ({} elements), {} variables",
        counts.scenes,
        counts.sections,
        counts.lines,
        counts.resources,
        counts.layouts,
        counts.layout_elements,
        counts.variables,
    );
    match &report.error {
        None => format!("ok {}: {summary}", report.project_id),
        Some(error) => {
            let mut text = format!("invalid {}: {error}\n  {summary}", report.project_id);
            if let Some(details) = &report.details {
                text.push_str(&format!("\n  details: {details}"));
            }
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_project_is_valid() {
        let report = check_state(&ProjectState::empty_at("p1", "Demo", "", 0));
        assert!(report.valid);
        assert_eq!(report.counts, StateCounts::default());
        assert!(format_human(&report).starts_with("ok p1: 0 scenes"));
    }

    #[test]
    fn dangling_scene_reference_is_reported() {
        let mut state = ProjectState::empty_at("p1", "Demo", "", 0);
        state.story.scene_order.push("ghost".into());
        let report = check_state(&state);
        assert!(!report.valid);
        assert!(report.error.is_some());
        assert!(format_human(&report).starts_with("invalid p1: "));
    }

    #[test]
    fn unsupported_model_version_is_reported() {
        let mut state = ProjectState::empty_at("p1", "Demo", "", 0);
        state.model_version += 1;
        let report = check_state(&state);
        assert_eq!(report.error.as_deref(), Some("Unsupported model version"));
        let details = report.details.unwrap();
        assert_eq!(details["got"], state.model_version);
    }
}
