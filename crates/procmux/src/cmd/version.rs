use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use procmux_process::Signal;
use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct BuildInfo {
    name: &'static str,
    version: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    build_target: &'static str,
    git_hash: &'static str,
    forwarded_signals: Vec<String>,
}

impl BuildInfo {
    fn current() -> Self {
        Self {
            name: "procmux",
            version: env!("CARGO_PKG_VERSION"),
            target_os: std::env::consts::OS,
            target_arch: std::env::consts::ARCH,
            build_target: option_env!("PROCMUX_BUILD_TARGET").unwrap_or("unknown"),
            git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
            forwarded_signals: [Signal::Int, Signal::Term]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.to_string()),
            ("version", self.version.to_string()),
            ("target_os", self.target_os.to_string()),
            ("target_arch", self.target_arch.to_string()),
            ("build_target", self.build_target.to_string()),
            ("git_hash", self.git_hash.to_string()),
            ("forwarded_signals", self.forwarded_signals.join(",")),
        ]
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("procmux {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let info = BuildInfo::current();
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in info.rows() {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (field, value) in info.rows() {
                println!("{field}: {value}");
            }
        }
    }
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_lists_forwarded_signals() {
        let info = BuildInfo::current();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["name"], "procmux");
        assert_eq!(json["forwarded_signals"][0], "SIGINT");
        assert_eq!(json["forwarded_signals"][1], "SIGTERM");
        assert_eq!(info.rows().len(), 7);
    }
}
