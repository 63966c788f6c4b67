use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use procmux_process::{OutputSelector, Signal};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command, passing through or buffering its output.
    Run(RunArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

/// Which buffered output to replay.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FlushChoice {
    Both,
    Stdout,
    Stderr,
    None,
}

impl FlushChoice {
    pub fn selector(self) -> Option<OutputSelector> {
        match self {
            FlushChoice::Both => Some(OutputSelector::Both),
            FlushChoice::Stdout => Some(OutputSelector::Stdout),
            FlushChoice::Stderr => Some(OutputSelector::Stderr),
            FlushChoice::None => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Hold child output until it exits instead of passing it through.
    #[arg(long)]
    pub buffered: bool,
    /// Prefix injected before every line of child output.
    #[arg(long, value_name = "PREFIX")]
    pub prefix: Option<String>,
    /// Buffered output to replay when the child fails.
    #[arg(long, value_enum, default_value = "both")]
    pub flush_on_failure: FlushChoice,
    /// Also replay buffered output when the child succeeds.
    #[arg(long)]
    pub flush_on_success: bool,
    /// Working directory for the child.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,
    /// Extra environment variable (repeatable).
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
    /// Do not inherit the host environment.
    #[arg(long)]
    pub env_clear: bool,
    /// Run the command line through `sh -c`.
    #[arg(long)]
    pub shell: bool,
    /// Terminate the child after this long (e.g. 30s, 500ms, 2m).
    #[arg(long)]
    pub timeout: Option<String>,
    /// Signal sent on timeout.
    #[arg(long, default_value = "TERM")]
    pub kill_signal: Signal,
    /// Do not forward SIGINT/SIGTERM to the child.
    #[arg(long)]
    pub no_forward_signals: bool,
    /// Print an outcome report after the child exits.
    #[arg(long)]
    pub report: bool,
    /// Command to run.
    pub command: String,
    /// Arguments passed to the command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
