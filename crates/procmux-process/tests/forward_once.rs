#![cfg(unix)]

use std::process::Command;
use std::time::Duration;

use procmux_process::{launch, LaunchHandle, LaunchOptions, Signal, StdinMode};
use procmux_stream::MemorySink;

/// Counts every SIGINT it receives on stdout instead of exiting.
const COUNT_INTERRUPTS: &str = "trap 'echo int' INT; echo ready; while :; do sleep 0.05; done";

fn signal_self(name: &str) {
    let status = Command::new("kill")
        .arg(format!("-{name}"))
        .arg(std::process::id().to_string())
        .status()
        .expect("kill should run");
    assert!(status.success());
}

fn counting_child() -> (LaunchHandle, MemorySink) {
    let out = MemorySink::new();
    let options = LaunchOptions::new()
        .with_stdout_sink(out.clone())
        .with_stderr_sink(MemorySink::new())
        .with_stdin(StdinMode::Null);
    (launch("sh", ["-c", COUNT_INTERRUPTS], options), out)
}

async fn wait_for_line(out: &MemorySink, line: &str) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !out.contents_string().lines().any(|l| l == line) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("child should print the expected line");
}

fn interrupts(out: &MemorySink) -> usize {
    out.contents_string().lines().filter(|l| *l == "int").count()
}

#[tokio::test]
async fn each_host_signal_is_forwarded_once_to_live_children_only() {
    let (first, first_out) = counting_child();
    let (second, second_out) = counting_child();
    wait_for_line(&first_out, "ready").await;
    wait_for_line(&second_out, "ready").await;

    let finished = launch(
        "true",
        Vec::<String>::new(),
        LaunchOptions::new()
            .with_stdout_sink(MemorySink::new())
            .with_stderr_sink(MemorySink::new())
            .with_stdin(StdinMode::Null),
    );
    assert!(finished.wait().await.is_success());

    signal_self("INT");
    wait_for_line(&first_out, "int").await;
    wait_for_line(&second_out, "int").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(interrupts(&first_out), 1);
    assert_eq!(interrupts(&second_out), 1);

    // The child that had already exited is left alone.
    assert!(finished.try_outcome().expect("resolved").is_success());
    assert!(!finished.kill(None));

    for handle in [&first, &second] {
        assert!(handle.kill(Some(Signal::Kill)));
        let outcome = tokio::time::timeout(Duration::from_secs(10), handle.wait())
            .await
            .expect("SIGKILL should stop the child");
        assert_eq!(outcome.signal(), Some(Signal::Kill));
    }
    assert_eq!(interrupts(&first_out), 1);
    assert_eq!(interrupts(&second_out), 1);
}
