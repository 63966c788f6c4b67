use std::fmt;
use std::io;

use procmux_process::{ProcessError, ProcessOutcome};

// Exit codes follow shell conventions for child failures.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;
pub const NOT_EXECUTABLE: i32 = 126;
pub const NOT_FOUND: i32 = 127;
pub const SIGNAL_BASE: i32 = 128;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: &io::Error) -> CliError {
    CliError::new(io_code(err), format!("{context}: {err}"))
}

fn io_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::NotFound => NOT_FOUND,
        io::ErrorKind::PermissionDenied => NOT_EXECUTABLE,
        _ => INTERNAL,
    }
}

pub fn process_error(context: &str, err: &ProcessError) -> CliError {
    match err {
        ProcessError::Spawn { source, .. } => {
            CliError::new(io_code(source), format!("{context}: {err}"))
        }
        ProcessError::Failed(failure) => CliError::new(
            failure_code(failure.code, failure.signal.map(|s| s.as_raw())),
            format!("{context}: {err}"),
        ),
        ProcessError::BufferingDisabled => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

/// Exit code the CLI reports for a finished child.
pub fn outcome_code(outcome: &ProcessOutcome) -> i32 {
    match outcome {
        ProcessOutcome::Succeeded => SUCCESS,
        ProcessOutcome::Failed(failure) => {
            failure_code(failure.code, failure.signal.map(|s| s.as_raw()))
        }
        ProcessOutcome::Errored(err) => process_error("launch failed", err).code,
    }
}

fn failure_code(code: Option<i32>, signal: Option<i32>) -> i32 {
    match (code, signal) {
        (_, Some(raw)) => SIGNAL_BASE + raw,
        (Some(code), None) if code != SUCCESS => code,
        _ => FAILURE,
    }
}
