use std::fmt;

use procmux_stream::{FlushSelector, MultiplexBuffer, STDERR, STDOUT};

use crate::error::{ProcessError, Result};
use crate::signal::Signal;

/// Exit code that counts as success.
pub const SUCCESS_CODE: i32 = 0;

/// Which buffered output channel(s) to flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputSelector {
    Stdout,
    Stderr,
    #[default]
    Both,
}

impl From<OutputSelector> for FlushSelector {
    fn from(selector: OutputSelector) -> Self {
        match selector {
            OutputSelector::Stdout => FlushSelector::Channel(STDOUT),
            OutputSelector::Stderr => FlushSelector::Channel(STDERR),
            OutputSelector::Both => FlushSelector::All,
        }
    }
}

/// Terminal classification of a launched process.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Exited with [`SUCCESS_CODE`] and no signal.
    Succeeded,
    /// Exited with another code or was terminated by a signal.
    Failed(FailureResult),
    /// Never ran, or could not be supervised.
    Errored(ProcessError),
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Succeeded)
    }

    pub fn failure(&self) -> Option<&FailureResult> {
        match self {
            ProcessOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessOutcome::Succeeded => Some(SUCCESS_CODE),
            ProcessOutcome::Failed(failure) => failure.code,
            ProcessOutcome::Errored(_) => None,
        }
    }

    pub fn signal(&self) -> Option<Signal> {
        self.failure().and_then(|failure| failure.signal)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            ProcessOutcome::Succeeded => Ok(()),
            ProcessOutcome::Failed(failure) => Err(ProcessError::Failed(Box::new(failure))),
            ProcessOutcome::Errored(err) => Err(err),
        }
    }
}

#[derive(Clone)]
enum OutputFlush {
    Buffered(MultiplexBuffer),
    Disabled,
}

/// Context for a child that ran and failed.
///
/// Carries a handle to the launch's output buffer so held output can be
/// replayed after the fact. The launch owns the buffer's lifetime: once
/// [`LaunchHandle::destroy_output`](crate::LaunchHandle::destroy_output) is
/// called, flushing does nothing.
#[derive(Clone)]
pub struct FailureResult {
    pub command: String,
    pub args: Vec<String>,
    pub code: Option<i32>,
    pub signal: Option<Signal>,
    output: OutputFlush,
}

impl FailureResult {
    pub(crate) fn new(
        command: String,
        args: Vec<String>,
        code: Option<i32>,
        signal: Option<Signal>,
        buffer: Option<MultiplexBuffer>,
    ) -> Self {
        Self {
            command,
            args,
            code,
            signal,
            output: match buffer {
                Some(buffer) => OutputFlush::Buffered(buffer),
                None => OutputFlush::Disabled,
            },
        }
    }

    /// Whether the launch buffered its output.
    pub fn is_buffered(&self) -> bool {
        matches!(self.output, OutputFlush::Buffered(_))
    }

    /// Deliver buffered output for `which` to the configured sinks, in
    /// arrival order. Output of the other channel is discarded.
    pub fn flush_output(&self, which: OutputSelector) -> Result<()> {
        match &self.output {
            OutputFlush::Buffered(buffer) => Ok(buffer.flush(which.into())?),
            OutputFlush::Disabled => Err(ProcessError::BufferingDisabled),
        }
    }
}

impl fmt::Display for FailureResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Running '{}' failed", self.command)?;
        if let Some(code) = self.code {
            write!(f, " (code = {code})")?;
        }
        if let Some(signal) = self.signal {
            write!(f, " (signal = {signal})")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FailureResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureResult")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("code", &self.code)
            .field("signal", &self.signal)
            .field("buffered", &self.is_buffered())
            .finish()
    }
}

impl std::error::Error for FailureResult {}

#[cfg(test)]
mod tests {
    use procmux_stream::{BufferOptions, ByteSink, MemorySink};

    use super::*;

    fn failure(code: Option<i32>, signal: Option<Signal>) -> FailureResult {
        FailureResult::new("make".to_string(), vec!["all".to_string()], code, signal, None)
    }

    #[test]
    fn message_with_code() {
        assert_eq!(
            failure(Some(123), None).to_string(),
            "Running 'make' failed (code = 123)"
        );
    }

    #[test]
    fn message_with_signal() {
        assert_eq!(
            failure(None, Some(Signal::Term)).to_string(),
            "Running 'make' failed (signal = SIGTERM)"
        );
    }

    #[test]
    fn message_with_neither() {
        assert_eq!(failure(None, None).to_string(), "Running 'make' failed");
    }

    #[test]
    fn flush_without_buffering_is_an_error() {
        let err = failure(Some(1), None)
            .flush_output(OutputSelector::Both)
            .unwrap_err();
        assert!(matches!(err, ProcessError::BufferingDisabled));
    }

    #[test]
    fn flush_stderr_only() {
        let out = MemorySink::new();
        let err = MemorySink::new();
        let sinks: Vec<Box<dyn ByteSink>> = vec![Box::new(out.clone()), Box::new(err.clone())];
        let (buffer, mut inputs) = MultiplexBuffer::new(
            sinks,
            BufferOptions {
                end_sink_on_channel_end: false,
            },
        );
        inputs[0].write_chunk(b"out").unwrap();
        inputs[1].write_chunk(b"err").unwrap();

        let result = FailureResult::new("x".into(), vec![], Some(1), None, Some(buffer));
        assert!(result.is_buffered());
        result.flush_output(OutputSelector::Stderr).unwrap();

        assert_eq!(err.contents_string(), "err");
        assert!(out.contents().is_empty());
    }

    #[test]
    fn outcome_accessors() {
        assert_eq!(ProcessOutcome::Succeeded.code(), Some(0));
        assert!(ProcessOutcome::Succeeded.into_result().is_ok());

        let failed = ProcessOutcome::Failed(failure(None, Some(Signal::Kill)));
        assert!(!failed.is_success());
        assert_eq!(failed.signal(), Some(Signal::Kill));
        assert_eq!(failed.code(), None);
        let err = failed.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Running 'make' failed (signal = SIGKILL)");

        let errored = ProcessOutcome::Errored(ProcessError::MissingPipe("stdout"));
        assert!(errored.failure().is_none());
        assert!(matches!(
            errored.into_result(),
            Err(ProcessError::MissingPipe("stdout"))
        ));
    }

    #[test]
    fn selector_mapping() {
        assert_eq!(
            FlushSelector::from(OutputSelector::Stdout),
            FlushSelector::Channel(STDOUT)
        );
        assert_eq!(
            FlushSelector::from(OutputSelector::Stderr),
            FlushSelector::Channel(STDERR)
        );
        assert_eq!(FlushSelector::from(OutputSelector::Both), FlushSelector::All);
    }
}
