use std::time::{Duration, Instant};

use procmux_process::{launch, LaunchOptions, OutputSelector, ProcessOutcome, StdinMode};

use crate::cmd::RunArgs;
use crate::exit::{
    io_error, outcome_code, process_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE,
};
use crate::output::{print_report, OutcomeReport, OutputFormat};

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    let env = args
        .env
        .iter()
        .map(|pair| parse_env(pair))
        .collect::<CliResult<Vec<_>>>()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", &err))?;

    runtime.block_on(execute(args, timeout, env, format))
}

async fn execute(
    args: RunArgs,
    timeout: Option<Duration>,
    env: Vec<(String, String)>,
    format: OutputFormat,
) -> CliResult<i32> {
    let mut options = LaunchOptions::new()
        .with_stdin(StdinMode::Inherit)
        .with_shell(args.shell)
        .with_env_clear(args.env_clear)
        .with_kill_signal(args.kill_signal)
        .with_forward_signals(!args.no_forward_signals);
    if args.buffered {
        options = options.buffered();
    }
    if let Some(prefix) = &args.prefix {
        options = options.with_line_prefix(prefix.clone());
    }
    if let Some(cwd) = &args.cwd {
        options = options.with_cwd(cwd.clone());
    }
    if let Some(timeout) = timeout {
        options = options.with_timeout(timeout);
    }
    for (key, value) in env {
        options = options.with_env(key, value);
    }

    tracing::debug!(command = %args.command, args = args.args.len(), buffered = args.buffered, "running");

    let started = Instant::now();
    let handle = launch(args.command.as_str(), &args.args, options);
    let outcome = handle.wait().await;
    let elapsed = started.elapsed();

    if args.buffered {
        replay_buffered(&handle, &outcome, &args)?;
        handle.destroy_output();
    }

    if args.report {
        print_report(
            &OutcomeReport::new(&args.command, &args.args, &outcome, elapsed),
            format,
        );
    }

    match &outcome {
        ProcessOutcome::Succeeded => Ok(SUCCESS),
        ProcessOutcome::Failed(failure) => Err(CliError::new(
            outcome_code(&outcome),
            failure.to_string(),
        )),
        ProcessOutcome::Errored(err) => Err(process_error("launch failed", err)),
    }
}

fn replay_buffered(
    handle: &procmux_process::LaunchHandle,
    outcome: &ProcessOutcome,
    args: &RunArgs,
) -> CliResult<()> {
    match outcome {
        ProcessOutcome::Failed(failure) => {
            if let Some(which) = args.flush_on_failure.selector() {
                failure
                    .flush_output(which)
                    .map_err(|err| process_error("flush failed", &err))?;
            }
        }
        ProcessOutcome::Succeeded if args.flush_on_success => {
            if let Some(buffer) = handle.output_buffer() {
                buffer
                    .flush(OutputSelector::Both.into())
                    .map_err(|err| CliError::new(INTERNAL, format!("flush failed: {err}")))?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse_env(pair: &str) -> CliResult<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::new(
            USAGE,
            format!("invalid environment entry (expected KEY=VALUE): {pair}"),
        )),
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = input.strip_suffix('m') {
        (num, "m")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
