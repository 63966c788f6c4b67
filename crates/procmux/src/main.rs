mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "procmux", version, about = "Run commands with buffered, prefixed output")]
struct Cli {
    /// Report format for `run --report`.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). Overrides PROCMUX_LOG; defaults to warn.
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::FlushChoice;

    #[test]
    fn parses_run_subcommand() {
        let cli = Cli::try_parse_from([
            "procmux",
            "run",
            "--buffered",
            "--prefix",
            "[build] ",
            "make",
            "all",
        ])
        .expect("run args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert!(args.buffered);
        assert_eq!(args.prefix.as_deref(), Some("[build] "));
        assert_eq!(args.command, "make");
        assert_eq!(args.args, vec!["all".to_string()]);
        assert_eq!(args.flush_on_failure, FlushChoice::Both);
    }

    #[test]
    fn trailing_args_keep_hyphens() {
        let cli = Cli::try_parse_from(["procmux", "run", "--", "ls", "-la", "--color=never"])
            .expect("trailing args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.command, "ls");
        assert_eq!(args.args, vec!["-la".to_string(), "--color=never".to_string()]);
    }

    #[test]
    fn parses_kill_signal_names() {
        let cli = Cli::try_parse_from(["procmux", "run", "--kill-signal", "SIGKILL", "sleep", "1"])
            .expect("signal should parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.kill_signal, procmux_process::Signal::Kill);
    }

    #[test]
    fn rejects_unknown_flush_choice() {
        let err = Cli::try_parse_from([
            "procmux",
            "run",
            "--flush-on-failure",
            "sometimes",
            "true",
        ])
        .expect_err("invalid choice should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn parses_version_subcommand() {
        let cli = Cli::try_parse_from(["procmux", "version", "--extended"])
            .expect("version args should parse");
        assert!(matches!(cli.command, Command::Version(_)));
    }
}
