use std::io::IsTerminal;
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use procmux_process::ProcessOutcome;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
pub struct OutcomeReport<'a> {
    schema_id: &'a str,
    command: &'a str,
    args: &'a [String],
    status: &'static str,
    code: Option<i32>,
    signal: Option<String>,
    error: Option<String>,
    duration_ms: u128,
}

impl<'a> OutcomeReport<'a> {
    pub fn new(
        command: &'a str,
        args: &'a [String],
        outcome: &ProcessOutcome,
        elapsed: Duration,
    ) -> Self {
        let (status, error) = match outcome {
            ProcessOutcome::Succeeded => ("succeeded", None),
            ProcessOutcome::Failed(failure) => ("failed", Some(failure.to_string())),
            ProcessOutcome::Errored(err) => ("errored", Some(err.to_string())),
        };
        Self {
            schema_id: "https://schemas.3leaps.dev/procmux/cli/v1/outcome.schema.json",
            command,
            args,
            status,
            code: outcome.code(),
            signal: outcome.signal().map(|s| s.to_string()),
            error,
            duration_ms: elapsed.as_millis(),
        }
    }
}

pub fn print_report(report: &OutcomeReport<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "STATUS", "CODE", "SIGNAL", "DURATION"])
                .add_row(vec![
                    command_line(report.command, report.args),
                    report.status.to_string(),
                    optional(report.code.map(|c| c.to_string())),
                    optional(report.signal.clone()),
                    format!("{}ms", report.duration_ms),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} status={} code={} signal={} duration={}ms",
                command_line(report.command, report.args),
                report.status,
                optional(report.code.map(|c| c.to_string())),
                optional(report.signal.clone()),
                report.duration_ms
            );
            if let Some(error) = &report.error {
                println!("error: {error}");
            }
        }
    }
}

fn command_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}
