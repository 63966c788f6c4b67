use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter, e.g. `procmux_process=debug`.
pub const LOG_ENV: &str = "PROCMUX_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Pick the filter directives: an explicit `--log-level` wins, then
/// [`LOG_ENV`], then `warn` so forwarded child stderr stays readable.
fn directives(level: Option<LogLevel>, env: Option<String>) -> String {
    match (level, env) {
        (Some(level), _) => level.as_directive().to_string(),
        (None, Some(env)) if !env.trim().is_empty() => env,
        _ => LogLevel::Warn.as_directive().to_string(),
    }
}

/// Logs go to stderr so they never interleave with forwarded child stdout.
pub fn init_logging(format: LogFormat, level: Option<LogLevel>) {
    let wanted = directives(level, std::env::var(LOG_ENV).ok());
    let filter = EnvFilter::try_new(&wanted).unwrap_or_else(|err| {
        eprintln!("warning: ignoring invalid {LOG_ENV} filter '{wanted}': {err}");
        EnvFilter::new(LogLevel::Warn.as_directive())
    });

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
