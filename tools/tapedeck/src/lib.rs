pub mod config;
pub mod errors;
pub mod harness;
pub mod logging;
pub mod replay;
pub mod runtime;
pub mod store;

pub use errors::TapedeckError;
pub use harness::{with_cassette, HarnessOptions, RecordMode};
pub use replay::recorder::record as start_recording;
pub use replay::recording::{CapturedCall, Cassette, CassetteName};
pub use replay::replayer::{playback as start_playback, OrderScope, ReplayMatcher};
pub use replay::session::{current_state, SessionMode};
pub use replay::spec::{InterceptionSpec, SpecSource};
pub use replay::target::{CallResult, Callable, CallableMeta, Target};

use clap::{error::ErrorKind, Parser, Subcommand};
use config::load_config;
use runtime::{FileSystem, ProductionFileSystem};
use std::io::Write;
use std::path::PathBuf;
use store::{CassetteStore, FileCassetteStore};

#[derive(Debug, Clone, Parser)]
#[command(name = "tapedeck")]
#[command(about = "Inspect tapedeck cassettes and configuration")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Summarize the calls recorded in a cassette.
    Show {
        name: String,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Load and validate a config file, then print the effective values.
    CheckConfig,
}

pub fn run() -> Result<i32, TapedeckError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let mut stdout = std::io::stdout();
    run_with(&args, &ProductionFileSystem, &mut stdout)
}

pub fn run_with(
    args: &[std::ffi::OsString],
    fs: &dyn FileSystem,
    out: &mut dyn Write,
) -> Result<i32, TapedeckError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                write!(out, "{error}").map_err(|e| TapedeckError::Io(e.to_string()))?;
                return Ok(0);
            }
            _ => return Err(TapedeckError::Cli(error.to_string())),
        },
    };

    let cfg = load_config(cli.config.as_deref(), fs)?;
    let lines = match cli.command {
        CliCommand::Show { name, dir } => {
            let name = CassetteName::parse(&name)?;
            let dir = dir.unwrap_or_else(|| cfg.cassettes.dir.clone());
            let store = FileCassetteStore::new(dir);
            if !store.exists(&name) {
                return Err(TapedeckError::Cli(format!(
                    "no cassette named {name} in {}",
                    store.dir().display()
                )));
            }
            let cassette = store.read(&name, &cfg.harness_options().serialization)?;
            summarize_cassette(&name, &cassette)
        }
        CliCommand::CheckConfig => {
            let rendered = toml::to_string_pretty(&cfg)
                .map_err(|e| TapedeckError::Serialization(e.to_string()))?;
            let mut lines = vec!["config ok".to_string()];
            lines.extend(rendered.lines().map(str::to_string));
            lines
        }
    };

    for line in lines {
        writeln!(out, "{line}").map_err(|e| TapedeckError::Io(e.to_string()))?;
    }
    Ok(0)
}

/// One header line, then each target with its arg keys in first-seen order.
pub fn summarize_cassette(name: &CassetteName, cassette: &Cassette) -> Vec<String> {
    let targets = cassette.targets();
    let mut lines = vec![format!(
        "cassette {name}: {} calls across {} targets (recorded_at_unix_ns={})",
        cassette.calls.len(),
        targets.len(),
        cassette.recorded_at_unix_ns
    )];
    for target in targets {
        let mut keys: Vec<(String, usize)> = Vec::new();
        for call in cassette.calls_for(&target) {
            let key = errors::display_key(&call.arg_key);
            match keys.iter_mut().find(|(k, _)| *k == key) {
                Some((_, count)) => *count += 1,
                None => keys.push((key, 1)),
            }
        }
        lines.push(target);
        lines.extend(keys.into_iter().map(|(key, count)| format!("  {key} x{count}")));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::{run_with, summarize_cassette};
    use crate::errors::TapedeckError;
    use crate::replay::recording::{CapturedCall, Cassette, CassetteName};
    use crate::runtime::FakeFileSystem;
    use serde_json::json;
    use std::ffi::OsString;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn summary_groups_by_target_and_key() {
        let call = |t: &str, k: serde_json::Value| CapturedCall {
            target_id: t.to_string(),
            arg_key: k,
            return_value: json!(null),
        };
        let cassette = Cassette::new(
            vec![
                call("users::fetch", json!([1])),
                call("rng::roll", json!([])),
                call("users::fetch", json!([1])),
                call("users::fetch", json!([2])),
            ],
            9,
        );
        let name = CassetteName::parse("mixed").expect("name");
        assert_eq!(
            summarize_cassette(&name, &cassette),
            vec![
                "cassette mixed: 4 calls across 2 targets (recorded_at_unix_ns=9)".to_string(),
                "rng::roll".to_string(),
                "  [] x1".to_string(),
                "users::fetch".to_string(),
                "  [1] x2".to_string(),
                "  [2] x1".to_string(),
            ]
        );
    }

    #[test]
    fn check_config_prints_effective_values() {
        let fs = FakeFileSystem::with_file("/repo/tapedeck.toml", "[recording]\nmode = \"always\"\n");
        let mut out = Vec::new();
        let code = run_with(
            &args(&["tapedeck", "check-config", "--config", "/repo/tapedeck.toml"]),
            &fs,
            &mut out,
        )
        .expect("run");
        assert_eq!(code, 0);
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("config ok\n"));
        assert!(text.contains("mode = \"always\""));
    }

    #[test]
    fn unknown_subcommand_is_a_cli_error() {
        let mut out = Vec::new();
        let err = run_with(&args(&["tapedeck", "rewind"]), &FakeFileSystem::default(), &mut out)
            .expect_err("unknown subcommand");
        assert!(matches!(err, TapedeckError::Cli(_)));
    }

    #[test]
    fn help_exits_zero() {
        let mut out = Vec::new();
        let code = run_with(&args(&["tapedeck", "--help"]), &FakeFileSystem::default(), &mut out)
            .expect("help");
        assert_eq!(code, 0);
        assert!(String::from_utf8(out).expect("utf8").contains("check-config"));
    }
}
