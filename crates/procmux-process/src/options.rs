use std::path::PathBuf;
use std::time::Duration;

use procmux_stream::{ByteSink, TextEncoding, WriterSink};

use crate::signal::Signal;

/// How child output reaches the caller's sinks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Forward every chunk as soon as it arrives.
    #[default]
    Immediate,
    /// Hold output in arrival order until it is flushed or discarded.
    Buffered,
}

/// What the child's standard input is connected to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StdinMode {
    /// A pipe owned by the [`LaunchHandle`](crate::LaunchHandle).
    #[default]
    Piped,
    /// The host's own standard input.
    Inherit,
    /// `/dev/null`.
    Null,
}

/// Options for [`launch`](crate::launch).
pub struct LaunchOptions {
    /// Delivery policy. Default: immediate.
    pub delivery: DeliveryPolicy,
    /// Prefix injected before every line of both output channels.
    pub line_prefix: Option<String>,
    /// Chunk interpretation used by the line prefixer.
    pub text_encoding: TextEncoding,
    /// Final destination of child stdout. Default: host stdout.
    pub stdout_sink: Box<dyn ByteSink>,
    /// Final destination of child stderr. Default: host stderr.
    pub stderr_sink: Box<dyn ByteSink>,
    pub stdin: StdinMode,
    /// Working directory of the child.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Start from an empty environment instead of inheriting the host's.
    pub env_clear: bool,
    /// Run `command` and its arguments through `sh -c`.
    pub shell: bool,
    /// Deliver `kill_signal` to the child once this much time has elapsed.
    pub timeout: Option<Duration>,
    /// Signal used on timeout. Default: SIGTERM.
    pub kill_signal: Signal,
    /// Forward host SIGINT/SIGTERM to the child. Default: true.
    pub forward_signals: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            delivery: DeliveryPolicy::Immediate,
            line_prefix: None,
            text_encoding: TextEncoding::default(),
            stdout_sink: Box::new(WriterSink::stdout()),
            stderr_sink: Box::new(WriterSink::stderr()),
            stdin: StdinMode::default(),
            cwd: None,
            env: Vec::new(),
            env_clear: false,
            shell: false,
            timeout: None,
            kill_signal: Signal::Term,
            forward_signals: true,
        }
    }
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `with_delivery(DeliveryPolicy::Buffered)`.
    pub fn buffered(self) -> Self {
        self.with_delivery(DeliveryPolicy::Buffered)
    }

    pub fn with_delivery(mut self, delivery: DeliveryPolicy) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_line_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.line_prefix = Some(prefix.into());
        self
    }

    pub fn with_text_encoding(mut self, encoding: TextEncoding) -> Self {
        self.text_encoding = encoding;
        self
    }

    pub fn with_stdout_sink(mut self, sink: impl ByteSink + 'static) -> Self {
        self.stdout_sink = Box::new(sink);
        self
    }

    pub fn with_stderr_sink(mut self, sink: impl ByteSink + 'static) -> Self {
        self.stderr_sink = Box::new(sink);
        self
    }

    pub fn with_stdin(mut self, stdin: StdinMode) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_env_clear(mut self, env_clear: bool) -> Self {
        self.env_clear = env_clear;
        self
    }

    pub fn with_shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_kill_signal(mut self, signal: Signal) -> Self {
        self.kill_signal = signal;
        self
    }

    pub fn with_forward_signals(mut self, forward: bool) -> Self {
        self.forward_signals = forward;
        self
    }
}

impl std::fmt::Debug for LaunchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchOptions")
            .field("delivery", &self.delivery)
            .field("line_prefix", &self.line_prefix)
            .field("text_encoding", &self.text_encoding)
            .field("stdin", &self.stdin)
            .field("cwd", &self.cwd)
            .field("env", &self.env.len())
            .field("env_clear", &self.env_clear)
            .field("shell", &self.shell)
            .field("timeout", &self.timeout)
            .field("kill_signal", &self.kill_signal)
            .field("forward_signals", &self.forward_signals)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = LaunchOptions::default();
        assert_eq!(options.delivery, DeliveryPolicy::Immediate);
        assert_eq!(options.stdin, StdinMode::Piped);
        assert_eq!(options.kill_signal, Signal::Term);
        assert!(options.forward_signals);
        assert!(options.line_prefix.is_none());
        assert!(options.timeout.is_none());
    }

    #[test]
    fn builder_sets_fields() {
        let options = LaunchOptions::new()
            .buffered()
            .with_line_prefix("[build] ")
            .with_env("A", "1")
            .with_env("B", "2")
            .with_shell(true)
            .with_timeout(Duration::from_secs(3))
            .with_kill_signal(Signal::Kill);

        assert_eq!(options.delivery, DeliveryPolicy::Buffered);
        assert_eq!(options.line_prefix.as_deref(), Some("[build] "));
        assert_eq!(options.env.len(), 2);
        assert!(options.shell);
        assert_eq!(options.timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.kill_signal, Signal::Kill);
    }
}
