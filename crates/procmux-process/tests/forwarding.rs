#![cfg(unix)]

use std::process::Command;
use std::time::Duration;

use procmux_process::{launch, LaunchOptions, Signal, StdinMode};
use procmux_stream::MemorySink;

fn signal_self(name: &str) {
    let status = Command::new("kill")
        .arg(format!("-{name}"))
        .arg(std::process::id().to_string())
        .status()
        .expect("kill should run");
    assert!(status.success());
}

#[tokio::test]
async fn host_interrupt_is_forwarded_to_child() {
    let options = LaunchOptions::new()
        .with_stdout_sink(MemorySink::new())
        .with_stderr_sink(MemorySink::new())
        .with_stdin(StdinMode::Null);
    let handle = launch("sleep", ["30"], options);
    assert!(handle.pid().is_some());

    signal_self("INT");

    let outcome = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("forwarded SIGINT should stop the child");
    assert_eq!(outcome.signal(), Some(Signal::Int));
    assert_eq!(
        outcome.failure().expect("expected failure").to_string(),
        "Running 'sleep' failed (signal = SIGINT)"
    );

    assert!(!handle.kill(None));
}
