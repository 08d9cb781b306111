// Report rendering for the CLI.
//
// Reports go to stdout as text on a terminal and as one JSON line otherwise;
// `--json` forces JSON. Failures go to stderr in the same format.

use std::io::{self, IsTerminal, Write};

use serde::Serialize;
use serde_json::json;

use crate::exit_code::{ExitCode, RuleViolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn detect(json_flag: bool) -> Self {
        Self::choose(json_flag, io::stdout().is_terminal())
    }

    fn choose(json_flag: bool, stdout_is_tty: bool) -> Self {
        if json_flag || !stdout_is_tty {
            Self::Json
        } else {
            Self::Human
        }
    }
}

pub fn print_output<T, F>(format: OutputFormat, report: &T, render: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    write_output(&mut io::stdout().lock(), format, report, render)
}

pub fn write_output<W, T, F>(out: &mut W, format: OutputFormat, report: &T, render: F) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    let text = match format {
        OutputFormat::Human => render(report),
        OutputFormat::Json => serde_json::to_string(report).map_err(io::Error::other)?,
    };
    writeln!(out, "{text}")
}

/// Describes `error` on stderr. The code is the first rule violation in the
/// chain, if any.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    let line = render_error(format, error, io::stderr().is_terminal());
    let _ = writeln!(io::stderr().lock(), "{line}");
}

fn render_error(format: OutputFormat, error: &anyhow::Error, color: bool) -> String {
    let message = format!("{error:#}");
    match format {
        OutputFormat::Json => {
            let code = error
                .chain()
                .find_map(|cause| cause.downcast_ref::<RuleViolation>())
                .map_or("error", |violation| violation.code.as_str());
            json!({
                "error": {
                    "code": code,
                    "message": message,
                    "exitCode": ExitCode::from_error(error).code(),
                }
            })
            .to_string()
        }
        OutputFormat::Human if color => format!("\x1b[31merror:\x1b[0m {message}"),
        OutputFormat::Human => format!("error: {message}"),
    }
}
