// `scenecraft replay`: fold a committed-event log through the relay registry.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;
use serde::Serialize;
use tracing::info;

use scenecraft_common::domain::model::{StateCounts, Timestamp};
use scenecraft_common::domain::ProjectState;
use scenecraft_relay::{read_committed_log, replay, ProjectRegistry, ReplayReport};

use super::read_json;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// JSON-lines log of committed events, or `-` for stdin.
    pub log: PathBuf,

    /// Project to print when the log spans several.
    #[arg(long)]
    pub project: Option<String>,

    /// Starting projection instead of an empty project.
    #[arg(long, value_name = "SNAPSHOT")]
    pub base: Option<PathBuf>,

    /// Print counts instead of the resulting state.
    #[arg(long)]
    pub summary: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub project_id: String,
    pub events: usize,
    #[serde(flatten)]
    pub report: ReplayReport,
    pub counts: StateCounts,
    pub updated_at: Timestamp,
}

pub fn run(args: ReplayArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match execute(&args) {
        Ok((summary, state)) => {
            if args.summary {
                output::print_output(format, &summary, format_human)?;
            } else {
                let mut out = io::stdout().lock();
                serde_json::to_writer_pretty(&mut out, &state)?;
                writeln!(out)?;
            }
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn execute(args: &ReplayArgs) -> anyhow::Result<(ReplaySummary, ProjectState)> {
    let reader: Box<dyn BufRead> = if args.log.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(&args.log).with_context(|| format!("failed to open {}", args.log.display()))?;
        Box::new(BufReader::new(file))
    };
    let events = read_committed_log(reader).with_context(|| format!("failed to read {}", args.log.display()))?;

    let mut registry = ProjectRegistry::new().with_auto_create();
    if let Some(path) = &args.base {
        let base: ProjectState = read_json(path)?;
        registry.register(base);
    }
    let report = replay(&mut registry, &events);
    info!(
        events = events.len(),
        applied = report.applied,
        rejected = report.rejected.len(),
        "log replayed"
    );

    let project_id = select_project(&registry, args.project.as_deref())?;
    let state = registry
        .get(&project_id)
        .cloned()
        .with_context(|| format!("project {project_id} not found"))?;
    let summary = ReplaySummary {
        project_id,
        events: events.len(),
        report,
        counts: state.counts(),
        updated_at: state.project.updated_at,
    };
    Ok((summary, state))
}

/// The requested project, or the only one the registry holds.
fn select_project(registry: &ProjectRegistry, requested: Option<&str>) -> anyhow::Result<String> {
    if let Some(project_id) = requested {
        if registry.get(project_id).is_none() {
            bail!("project {project_id} does not appear in the log");
        }
        return Ok(project_id.to_string());
    }

    let mut ids: Vec<&str> = registry.project_ids().collect();
    ids.sort_unstable();
    match ids.as_slice() {
        [] => bail!("log contains no projects"),
        [only] => Ok((*only).to_string()),
        many => bail!("log spans several projects ({}); pass --project", many.join(", ")),
    }
}

fn format_human(summary: &ReplaySummary) -> String {
    let report = &summary.report;
    let counts = &summary.counts;
    let mut lines = vec![
        format!(
            "{}: {} events, {} applied, {} legacy, {} duplicates, {} rejected",
            summary.project_id,
            summary.events,
            report.applied,
            report.legacy,
            report.duplicates,
            report.rejected.len(),
        ),
        format!(
            "  {} scenes, {} sections, {} lines, {} resources, {} layouts, {} variables",
            counts.scenes, counts.sections, counts.lines, counts.resources, counts.layouts, counts.variables,
        ),
    ];
    for entry in &report.rejected {
        let message = entry.rejection.message.as_deref().unwrap_or("rejected");
        lines.push(format!("  rejected {}: {message}", entry.event_id));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenecraft_common::domain::{Actor, Command, COMMAND_VERSION};
    use scenecraft_common::protocol::{command_to_wire_event, CommittedEvent};
    use serde_json::{json, Value};

    fn committed(project: &str, seq: u64, kind: &str, payload: Value) -> CommittedEvent {
        let command = Command {
            id: format!("{project}-cmd-{seq}"),
            project_id: project.into(),
            partition: format!("project:{project}:story"),
            partitions: None,
            command_type: kind.into(),
            payload,
            actor: Actor::new("u1", "c1"),
            client_ts: seq as i64 * 10,
            command_version: COMMAND_VERSION,
        };
        CommittedEvent {
            id: format!("{project}-evt-{seq}"),
            committed_id: Some(seq),
            partitions: command.target_partitions(),
            event: command_to_wire_event(&command),
            server_ts: None,
        }
    }

    fn write_log(dir: &tempfile::TempDir, events: &[CommittedEvent]) -> PathBuf {
        let path = dir.path().join("log.jsonl");
        let text: Vec<String> = events.iter().map(|e| serde_json::to_string(e).unwrap()).collect();
        std::fs::write(&path, text.join("\n")).unwrap();
        path
    }

    fn args(log: PathBuf) -> ReplayArgs {
        ReplayArgs { log, project: None, base: None, summary: false, json: true }
    }

    #[test]
    fn replays_single_project_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(
            &dir,
            &[
                committed("film", 1, "scene.create", json!({ "sceneId": "s1", "name": "One" })),
                committed("film", 2, "scene.rename", json!({ "sceneId": "s1", "name": "Two" })),
                committed("film", 3, "scene.delete", json!({ "sceneId": "ghost" })),
            ],
        );
        let (summary, state) = execute(&args(log)).unwrap();
        assert_eq!(summary.project_id, "film");
        assert_eq!(summary.events, 3);
        assert_eq!(summary.report.applied, 2);
        assert_eq!(summary.report.rejected.len(), 1);
        assert_eq!(state.scenes["s1"].name, "Two");
        assert_eq!(summary.updated_at, 20);
        assert!(format_human(&summary).contains("rejected film-evt-3"));
    }

    #[test]
    fn several_projects_need_a_selection() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(
            &dir,
            &[
                committed("a", 1, "scene.create", json!({ "sceneId": "s1", "name": "One" })),
                committed("b", 2, "scene.create", json!({ "sceneId": "s2", "name": "Two" })),
            ],
        );
        let err = execute(&args(log.clone())).unwrap_err();
        assert!(err.to_string().contains("a, b"), "{err:#}");

        let mut selected = args(log);
        selected.project = Some("b".into());
        let (summary, state) = execute(&selected).unwrap();
        assert_eq!(summary.project_id, "b");
        assert!(state.scenes.contains_key("s2"));

        selected.project = Some("zzz".into());
        assert!(execute(&selected).is_err());
    }

    #[test]
    fn base_snapshot_seeds_the_projection() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = ProjectState::empty_at("film", "Feature", "", 0);
        let seeded = scenecraft_common::domain::process_command(
            &base,
            &Command {
                id: "seed".into(),
                project_id: "film".into(),
                partition: "project:film:story".into(),
                command_type: "scene.create".into(),
                payload: json!({ "sceneId": "s0", "name": "Seed" }),
                actor: Actor::new("u1", "c1"),
                client_ts: 1,
                command_version: COMMAND_VERSION,
                ..Command::default()
            },
        )
        .unwrap();
        base = seeded.state;
        let base_path = dir.path().join("base.json");
        std::fs::write(&base_path, serde_json::to_string(&base).unwrap()).unwrap();

        let log = write_log(&dir, &[committed("film", 1, "scene.rename", json!({ "sceneId": "s0", "name": "Renamed" }))]);
        let mut with_base = args(log);
        with_base.base = Some(base_path);
        let (summary, state) = execute(&with_base).unwrap();
        assert_eq!(summary.report.applied, 1);
        assert_eq!(state.project.name, "Feature");
        assert_eq!(state.scenes["s0"].name, "Renamed");
    }

    #[test]
    fn empty_log_has_no_project() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(&dir, &[]);
        let err = execute(&args(log)).unwrap_err();
        assert!(err.to_string().contains("no projects"));
    }

    #[test]
    fn missing_log_is_an_input_error() {
        let err = execute(&args(PathBuf::from("/nonexistent/log.jsonl"))).unwrap_err();
        assert_eq!(crate::exit_code::ExitCode::from_error(&err), crate::exit_code::ExitCode::Input);
    }
}
