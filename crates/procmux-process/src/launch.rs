use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use procmux_stream::{MultiplexBuffer, STDERR, STDOUT};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{ProcessError, Result};
use crate::options::{LaunchOptions, StdinMode};
use crate::outcome::{FailureResult, ProcessOutcome, SUCCESS_CODE};
use crate::pipeline::{pump, Pipeline};
use crate::signal::{send_signal, ForwardingHooks, Signal};

/// How long output may keep arriving after the child has exited, e.g. from
/// a background grandchild still holding the pipes.
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// A launched child: an awaitable outcome plus a synchronous kill switch.
///
/// Dropping the handle while the child is still running sends it SIGTERM.
pub struct LaunchHandle {
    command: String,
    pid: Option<u32>,
    outcome: watch::Receiver<Option<ProcessOutcome>>,
    kill_tx: Option<mpsc::UnboundedSender<Signal>>,
    stdin: Option<ChildStdin>,
    buffer: Option<MultiplexBuffer>,
}

impl LaunchHandle {
    fn resolved(command: String, outcome: ProcessOutcome) -> Self {
        let (_tx, rx) = watch::channel(Some(outcome));
        Self {
            command,
            pid: None,
            outcome: rx,
            kill_tx: None,
            stdin: None,
            buffer: None,
        }
    }

    /// Wait for the child to terminate (or fail to start).
    ///
    /// Every call returns the same outcome.
    pub async fn wait(&self) -> ProcessOutcome {
        let mut rx = self.outcome.clone();
        let resolved = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        resolved.unwrap_or(ProcessOutcome::Errored(ProcessError::Abandoned))
    }

    /// The outcome, if the child has already terminated.
    pub fn try_outcome(&self) -> Option<ProcessOutcome> {
        self.outcome.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Request termination of the child with `signal` (default SIGTERM).
    ///
    /// Returns false without doing anything once the outcome is resolved.
    pub fn kill(&self, signal: Option<Signal>) -> bool {
        if self.is_finished() {
            return false;
        }
        match &self.kill_tx {
            Some(tx) => tx.send(signal.unwrap_or(Signal::Term)).is_ok(),
            None => false,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// OS process id, if the child started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the child's stdin pipe (only with [`StdinMode::Piped`]).
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// The output buffer, under buffered delivery.
    pub fn output_buffer(&self) -> Option<&MultiplexBuffer> {
        self.buffer.as_ref()
    }

    /// End the caller's sinks and discard anything still buffered.
    ///
    /// Flushing through a [`FailureResult`] afterwards does nothing.
    pub fn destroy_output(&self) {
        if let Some(buffer) = &self.buffer {
            buffer.destroy();
        }
    }
}

impl Drop for LaunchHandle {
    fn drop(&mut self) {
        if self.is_finished() {
            return;
        }
        if let Some(tx) = &self.kill_tx {
            tracing::debug!(command = %self.command, "launch handle dropped while running; terminating child");
            let _ = tx.send(Signal::Term);
        }
    }
}

impl std::fmt::Debug for LaunchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchHandle")
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("finished", &self.is_finished())
            .field("buffered", &self.buffer.is_some())
            .finish()
    }
}

/// Launch `command` with `args`.
///
/// Must be called from within a tokio runtime. Never fails directly: a
/// child that cannot be started resolves to [`ProcessOutcome::Errored`].
pub fn launch<I, S>(command: impl Into<String>, args: I, options: LaunchOptions) -> LaunchHandle
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let command = command.into();
    let args: Vec<String> = args.into_iter().map(Into::into).collect();

    let LaunchOptions {
        delivery,
        line_prefix,
        text_encoding,
        stdout_sink,
        stderr_sink,
        stdin,
        cwd,
        env,
        env_clear,
        shell,
        timeout,
        kill_signal,
        forward_signals,
    } = options;

    let mut cmd = if shell {
        let mut line = command.clone();
        for arg in &args {
            line.push(' ');
            line.push_str(arg);
        }
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(line);
        cmd
    } else {
        let mut cmd = Command::new(&command);
        cmd.args(&args);
        cmd
    };
    if env_clear {
        cmd.env_clear();
    }
    cmd.envs(env);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdin(match stdin {
        StdinMode::Piped => Stdio::piped(),
        StdinMode::Inherit => Stdio::inherit(),
        StdinMode::Null => Stdio::null(),
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            tracing::debug!(command = %command, error = %source, "failed to start child");
            let err = ProcessError::Spawn {
                command: command.clone(),
                source: Arc::new(source),
            };
            return LaunchHandle::resolved(command, ProcessOutcome::Errored(err));
        }
    };

    let pid = child.id();
    tracing::debug!(command = %command, args = args.len(), ?pid, ?delivery, "child started");

    let child_stdin = child.stdin.take();
    let wired = match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => Pipeline::build(
            delivery,
            line_prefix.as_deref(),
            text_encoding,
            stdout_sink,
            stderr_sink,
        )
        .map(|pipeline| (stdout, stderr, pipeline)),
        (None, _) => Err(ProcessError::MissingPipe("stdout")),
        (_, None) => Err(ProcessError::MissingPipe("stderr")),
    };
    let (stdout, stderr, pipeline) = match wired {
        Ok(wired) => wired,
        Err(err) => {
            discard_child(child, &command);
            return LaunchHandle::resolved(command, ProcessOutcome::Errored(err));
        }
    };

    let (detach, detached) = watch::channel(false);
    let readers = vec![
        tokio::spawn(pump(stdout, pipeline.stdout, STDOUT, detached.clone())),
        tokio::spawn(pump(stderr, pipeline.stderr, STDERR, detached)),
    ];
    let hooks = if forward_signals {
        ForwardingHooks::register()
    } else {
        ForwardingHooks::disabled()
    };

    let (outcome_tx, outcome_rx) = watch::channel(None);
    let (kill_tx, kill_rx) = mpsc::unbounded_channel();

    let supervisor = Supervisor {
        command: command.clone(),
        args,
        buffer: pipeline.buffer.clone(),
        timeout,
        kill_signal,
        hooks,
        kill_rx,
        readers,
        detach,
        outcome_tx,
    };
    tokio::spawn(supervisor.run(child));

    LaunchHandle {
        command,
        pid,
        outcome: outcome_rx,
        kill_tx: Some(kill_tx),
        stdin: child_stdin,
        buffer: pipeline.buffer,
    }
}

/// Launch and wait, mapping anything but success to an error.
pub async fn run<I, S>(
    command: impl Into<String>,
    args: I,
    options: LaunchOptions,
) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    launch(command, args, options).wait().await.into_result()
}

/// Kill a child that will never be supervised and reap it in the background.
fn discard_child(mut child: Child, command: &str) {
    if let Err(err) = child.start_kill() {
        tracing::warn!(command = %command, error = %err, "failed to kill unwired child");
    }
    let command = command.to_string();
    tokio::spawn(async move {
        if let Err(err) = child.wait().await {
            tracing::warn!(command = %command, error = %err, "failed to reap unwired child");
        }
    });
}

/// Owns the child until it exits, then publishes the outcome.
struct Supervisor {
    command: String,
    args: Vec<String>,
    buffer: Option<MultiplexBuffer>,
    timeout: Option<Duration>,
    kill_signal: Signal,
    hooks: ForwardingHooks,
    kill_rx: mpsc::UnboundedReceiver<Signal>,
    readers: Vec<JoinHandle<()>>,
    detach: watch::Sender<bool>,
    outcome_tx: watch::Sender<Option<ProcessOutcome>>,
}

impl Supervisor {
    async fn run(mut self, mut child: Child) {
        let deadline = tokio::time::sleep(self.timeout.unwrap_or(Duration::MAX));
        tokio::pin!(deadline);
        let mut timed_out = self.timeout.is_none();
        let mut kill_open = true;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                trigger = self.hooks.next() => {
                    let signal = trigger.forwarded_signal();
                    tracing::info!(command = %self.command, %signal, "forwarding host signal to child");
                    self.signal_child(&child, signal);
                }
                requested = self.kill_rx.recv(), if kill_open => match requested {
                    Some(signal) => self.signal_child(&child, signal),
                    None => kill_open = false,
                },
                () = &mut deadline, if !timed_out => {
                    timed_out = true;
                    tracing::warn!(
                        command = %self.command,
                        signal = %self.kill_signal,
                        "child timed out"
                    );
                    self.signal_child(&child, self.kill_signal);
                }
            }
        };

        // The child is gone; no host signal may reach it from here on.
        self.hooks = ForwardingHooks::disabled();
        self.kill_rx.close();

        self.drain_readers().await;

        let outcome = match status {
            Ok(status) => self.classify(status),
            Err(source) => ProcessOutcome::Errored(ProcessError::Wait {
                command: self.command.clone(),
                source: Arc::new(source),
            }),
        };
        self.outcome_tx.send_replace(Some(outcome));
    }

    /// Wait for the output readers to reach EOF, detaching any that are
    /// still open once [`OUTPUT_GRACE`] has passed.
    async fn drain_readers(&mut self) {
        let deadline = tokio::time::Instant::now() + OUTPUT_GRACE;
        for mut reader in std::mem::take(&mut self.readers) {
            let joined = match tokio::time::timeout_at(deadline, &mut reader).await {
                Ok(joined) => joined,
                Err(_) => {
                    if !*self.detach.borrow() {
                        tracing::debug!(command = %self.command, "output still open after child exit; detaching");
                        self.detach.send_replace(true);
                    }
                    reader.await
                }
            };
            if let Err(err) = joined {
                tracing::warn!(command = %self.command, error = %err, "output reader task failed");
            }
        }
    }

    fn signal_child(&self, child: &Child, signal: Signal) {
        let Some(pid) = child.id() else {
            return;
        };
        if let Err(err) = send_signal(pid, signal) {
            tracing::warn!(command = %self.command, pid, %signal, error = %err, "failed to signal child");
        }
    }

    fn classify(&self, status: ExitStatus) -> ProcessOutcome {
        let code = status.code();
        let signal = status.signal().map(Signal::from_raw);
        tracing::debug!(command = %self.command, ?code, ?signal, "child exited");

        if code == Some(SUCCESS_CODE) && signal.is_none() {
            return ProcessOutcome::Succeeded;
        }
        ProcessOutcome::Failed(FailureResult::new(
            self.command.clone(),
            self.args.clone(),
            code,
            signal,
            self.buffer.clone(),
        ))
    }
}
