//! Signals and host-termination forwarding.

use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::signal::unix::{signal, SignalKind};

/// A Unix signal, named the way `kill -l` names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Hup,
    Int,
    Quit,
    Abrt,
    Kill,
    Usr1,
    Usr2,
    Pipe,
    Alrm,
    Term,
    /// Any signal without a named variant.
    Other(i32),
}

impl Signal {
    /// Raw signal number.
    pub fn as_raw(self) -> i32 {
        match self {
            Signal::Hup => libc::SIGHUP,
            Signal::Int => libc::SIGINT,
            Signal::Quit => libc::SIGQUIT,
            Signal::Abrt => libc::SIGABRT,
            Signal::Kill => libc::SIGKILL,
            Signal::Usr1 => libc::SIGUSR1,
            Signal::Usr2 => libc::SIGUSR2,
            Signal::Pipe => libc::SIGPIPE,
            Signal::Alrm => libc::SIGALRM,
            Signal::Term => libc::SIGTERM,
            Signal::Other(raw) => raw,
        }
    }

    pub fn from_raw(raw: i32) -> Self {
        match raw {
            libc::SIGHUP => Signal::Hup,
            libc::SIGINT => Signal::Int,
            libc::SIGQUIT => Signal::Quit,
            libc::SIGABRT => Signal::Abrt,
            libc::SIGKILL => Signal::Kill,
            libc::SIGUSR1 => Signal::Usr1,
            libc::SIGUSR2 => Signal::Usr2,
            libc::SIGPIPE => Signal::Pipe,
            libc::SIGALRM => Signal::Alrm,
            libc::SIGTERM => Signal::Term,
            other => Signal::Other(other),
        }
    }

    /// Name without the `SIG` prefix, if the signal has one.
    fn short_name(self) -> Option<&'static str> {
        let name = match self {
            Signal::Hup => "HUP",
            Signal::Int => "INT",
            Signal::Quit => "QUIT",
            Signal::Abrt => "ABRT",
            Signal::Kill => "KILL",
            Signal::Usr1 => "USR1",
            Signal::Usr2 => "USR2",
            Signal::Pipe => "PIPE",
            Signal::Alrm => "ALRM",
            Signal::Term => "TERM",
            Signal::Other(_) => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.short_name() {
            Some(name) => write!(f, "SIG{name}"),
            None => write!(f, "SIG{}", self.as_raw()),
        }
    }
}

/// Error returned when a signal name cannot be parsed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown signal: {0}")]
pub struct ParseSignalError(String);

impl FromStr for Signal {
    type Err = ParseSignalError;

    /// Accepts `SIGTERM`, `TERM`, `term` or a raw number such as `15`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(raw) = trimmed.parse::<i32>() {
            if raw > 0 {
                return Ok(Signal::from_raw(raw));
            }
            return Err(ParseSignalError(s.to_string()));
        }

        let upper = trimmed.to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        ALL_NAMED
            .iter()
            .copied()
            .find(|sig| sig.short_name() == Some(name))
            .ok_or_else(|| ParseSignalError(s.to_string()))
    }
}

const ALL_NAMED: [Signal; 10] = [
    Signal::Hup,
    Signal::Int,
    Signal::Quit,
    Signal::Abrt,
    Signal::Kill,
    Signal::Usr1,
    Signal::Usr2,
    Signal::Pipe,
    Signal::Alrm,
    Signal::Term,
];

/// Send `signal` to process `pid`.
pub(crate) fn send_signal(pid: u32, signal: Signal) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: `kill` has no memory-safety preconditions; `pid` is a positive
    // process id obtained from a child this process spawned and has not yet
    // reaped.
    let rc = unsafe { libc::kill(pid, signal.as_raw()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// A termination request received by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostTrigger {
    /// SIGINT, typically Ctrl-C.
    Interrupt,
    /// SIGTERM, the host is being asked to exit.
    Terminate,
}

impl HostTrigger {
    /// The signal forwarded to the child for this trigger.
    pub(crate) fn forwarded_signal(self) -> Signal {
        match self {
            HostTrigger::Interrupt => Signal::Int,
            HostTrigger::Terminate => Signal::Term,
        }
    }
}

/// Signals the host forwards to its children.
const FORWARDED: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

/// Host-wide bookkeeping for the forwarded signals' dispositions.
///
/// tokio installs its handler once per process and never removes it, so
/// the host's own disposition is saved when the first forwarding launch
/// starts and put back when the last one ends. The installed handler is
/// remembered so later launches can put it back in place.
struct HostDispositions {
    live: usize,
    host: Option<[libc::sigaction; 2]>,
    forwarding: Option<[libc::sigaction; 2]>,
}

static HOST_DISPOSITIONS: Mutex<HostDispositions> = Mutex::new(HostDispositions {
    live: 0,
    host: None,
    forwarding: None,
});

fn host_dispositions() -> MutexGuard<'static, HostDispositions> {
    HOST_DISPOSITIONS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Current dispositions of [`FORWARDED`], in order.
fn read_dispositions() -> io::Result<[libc::sigaction; 2]> {
    // SAFETY: `sigaction` is plain old data; all-zero is a valid value that
    // is fully overwritten below.
    let mut actions: [libc::sigaction; 2] = unsafe { std::mem::zeroed() };
    for (signum, action) in FORWARDED.iter().zip(actions.iter_mut()) {
        // SAFETY: a null `act` only queries; `oldact` points to a live,
        // writable `sigaction`.
        let rc = unsafe { libc::sigaction(*signum, std::ptr::null(), action) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(actions)
}

fn write_dispositions(actions: &[libc::sigaction; 2]) -> io::Result<()> {
    for (signum, action) in FORWARDED.iter().zip(actions.iter()) {
        // SAFETY: `action` was read back from the kernel by
        // `read_dispositions`, so its handler and flags are valid; a null
        // `oldact` is permitted.
        let rc = unsafe { libc::sigaction(*signum, action, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Holds the host's forwarded-signal dispositions for one launch.
///
/// Dropping the last live lease restores what the host had before.
struct DispositionLease;

impl Drop for DispositionLease {
    fn drop(&mut self) {
        let mut state = host_dispositions();
        state.live = state.live.saturating_sub(1);
        if state.live > 0 {
            return;
        }
        if let Some(host) = &state.host {
            if let Err(err) = write_dispositions(host) {
                tracing::warn!(error = %err, "failed to restore host signal dispositions");
            }
        }
    }
}

/// Host signal listeners registered for one launch.
///
/// Dropping the hooks deregisters both listeners, and the last hooks alive
/// hand SIGINT and SIGTERM back to the host's previous disposition.
pub(crate) struct ForwardingHooks {
    interrupt: Option<tokio::signal::unix::Signal>,
    terminate: Option<tokio::signal::unix::Signal>,
    _lease: Option<DispositionLease>,
}

impl ForwardingHooks {
    /// Register listeners for SIGINT and SIGTERM.
    ///
    /// Must be called from within a tokio runtime. A listener that cannot be
    /// registered is logged and skipped.
    pub(crate) fn register() -> Self {
        let mut state = host_dispositions();
        if state.live == 0 {
            match read_dispositions() {
                Ok(host) => state.host = Some(host),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read host signal dispositions");
                    state.host = None;
                }
            }
            if let Some(forwarding) = &state.forwarding {
                if let Err(err) = write_dispositions(forwarding) {
                    tracing::warn!(error = %err, "failed to reinstall signal forwarding");
                }
            }
        }

        let interrupt = register_one(SignalKind::interrupt(), "SIGINT");
        let terminate = register_one(SignalKind::terminate(), "SIGTERM");

        if state.forwarding.is_none() && interrupt.is_some() && terminate.is_some() {
            state.forwarding = read_dispositions().ok();
        }
        state.live += 1;

        Self {
            interrupt,
            terminate,
            _lease: Some(DispositionLease),
        }
    }

    /// Hooks that never fire.
    pub(crate) fn disabled() -> Self {
        Self {
            interrupt: None,
            terminate: None,
            _lease: None,
        }
    }

    /// Wait for the next host trigger. Pends forever if none is registered.
    pub(crate) async fn next(&mut self) -> HostTrigger {
        tokio::select! {
            () = recv_or_pending(&mut self.interrupt) => HostTrigger::Interrupt,
            () = recv_or_pending(&mut self.terminate) => HostTrigger::Terminate,
        }
    }
}

fn register_one(kind: SignalKind, name: &str) -> Option<tokio::signal::unix::Signal> {
    match signal(kind) {
        Ok(listener) => Some(listener),
        Err(err) => {
            tracing::warn!(signal = name, error = %err, "failed to register host signal listener");
            None
        }
    }
}

async fn recv_or_pending(listener: &mut Option<tokio::signal::unix::Signal>) {
    match listener {
        Some(listener) => {
            if listener.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip_for_named_signals() {
        for sig in ALL_NAMED {
            assert_eq!(Signal::from_raw(sig.as_raw()), sig);
        }
        assert_eq!(Signal::from_raw(libc::SIGTERM), Signal::Term);
    }

    #[test]
    fn display_uses_sig_prefix() {
        assert_eq!(Signal::Term.to_string(), "SIGTERM");
        assert_eq!(Signal::Int.to_string(), "SIGINT");
        assert_eq!(Signal::Other(40).to_string(), "SIG40");
    }

    #[test]
    fn parses_names_and_numbers() {
        assert_eq!("SIGKILL".parse::<Signal>().unwrap(), Signal::Kill);
        assert_eq!("term".parse::<Signal>().unwrap(), Signal::Term);
        assert_eq!(" hup ".parse::<Signal>().unwrap(), Signal::Hup);
        assert_eq!("2".parse::<Signal>().unwrap(), Signal::Int);
        assert!("SIGNOPE".parse::<Signal>().is_err());
        assert!("0".parse::<Signal>().is_err());
    }

    #[test]
    fn triggers_map_to_forwarded_signals() {
        assert_eq!(HostTrigger::Interrupt.forwarded_signal(), Signal::Int);
        assert_eq!(HostTrigger::Terminate.forwarded_signal(), Signal::Term);
    }

    #[test]
    fn signal_to_missing_pid_fails() {
        // pid_t::MAX is never a live process.
        let err = send_signal(libc::pid_t::MAX as u32, Signal::Term).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ESRCH));
    }

    #[tokio::test]
    async fn disabled_hooks_never_fire() {
        let mut hooks = ForwardingHooks::disabled();
        let fired =
            tokio::time::timeout(std::time::Duration::from_millis(20), hooks.next()).await;
        assert!(fired.is_err());
    }
}
