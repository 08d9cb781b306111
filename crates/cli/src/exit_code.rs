// Consistent exit codes for the scenecraft CLI.
//
//   0 = success
//   1 = general error
//   2 = usage/argument error
//   3 = input read but violates document rules
//   4 = input could not be read or parsed

use std::process;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Violation = 3,
    Input = 4,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.downcast_ref::<RuleViolation>().is_some() {
                return Self::Violation;
            }
            if cause.downcast_ref::<serde_json::Error>().is_some() {
                return Self::Input;
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Self::Input,
                    std::io::ErrorKind::InvalidInput => Self::Usage,
                    _ => Self::Error,
                };
            }
        }
        Self::Error
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

/// The input was well-formed but broke a validation, precondition or invariant rule.
#[derive(Debug)]
pub struct RuleViolation {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RuleViolation {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Error.code(), 1);
        assert_eq!(ExitCode::Usage.code(), 2);
        assert_eq!(ExitCode::Violation.code(), 3);
        assert_eq!(ExitCode::Input.code(), 4);
    }

    #[test]
    fn violation_in_chain() {
        let err = anyhow::Error::new(RuleViolation { code: "validation_failed".into(), message: "nope".into() })
            .context("validating command.json");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Violation);
    }

    #[test]
    fn missing_file_is_input_error() {
        let err = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
            .context("failed to read snapshot.json");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Input);
    }

    #[test]
    fn bad_json_is_input_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").context("parse").unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::Input);
    }

    #[test]
    fn generic_is_error() {
        assert_eq!(ExitCode::from_error(&anyhow::anyhow!("something went wrong")), ExitCode::Error);
    }
}
