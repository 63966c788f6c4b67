#![cfg(unix)]

use std::process::Command;
use std::time::Duration;

use procmux_process::{launch, LaunchOptions, Signal, StdinMode};
use procmux_stream::MemorySink;

fn options() -> LaunchOptions {
    LaunchOptions::new()
        .with_stdout_sink(MemorySink::new())
        .with_stderr_sink(MemorySink::new())
        .with_stdin(StdinMode::Null)
}

fn signal_self(name: &str) {
    let status = Command::new("kill")
        .arg(format!("-{name}"))
        .arg(std::process::id().to_string())
        .status()
        .expect("kill should run");
    assert!(status.success());
}

#[tokio::test]
async fn host_terminate_is_forwarded_as_sigterm() {
    // A finished launch hands the signals back to the host; the next launch
    // must take them over again.
    assert!(launch("true", Vec::<String>::new(), options())
        .wait()
        .await
        .is_success());

    let handle = launch("sleep", ["30"], options());
    signal_self("TERM");

    let outcome = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("forwarded SIGTERM should stop the child");
    assert_eq!(outcome.signal(), Some(Signal::Term));
    assert_eq!(
        outcome.failure().expect("expected failure").to_string(),
        "Running 'sleep' failed (signal = SIGTERM)"
    );
}
