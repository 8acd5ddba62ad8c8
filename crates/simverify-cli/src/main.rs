//! Verify an app deployment on the iOS Simulator.
//!
//! Runs a fixed sequence of checks (model assets on disk, assets bundled into
//! the built app, simulator booted, app installed, app launches) and exits 0
//! only if every check passed.
//!
//! # Usage
//!
//! ```bash
//! # Full diagnostic run with configured/default values
//! simverify
//!
//! # Fast smoke test that stops at the first failure
//! simverify --mode basic
//!
//! # Target another simulator and app
//! simverify --simulator 0A6913C4-12DB-4112-AA76-B9E0753ED305 --bundle-id com.example.app
//!
//! # Machine-readable summary
//! simverify --format json
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use simverify_core::check::Mode;
use simverify_core::command::SystemRunner;
use simverify_core::config::{ConfigError, VerifyConfig};
use simverify_core::runner::VerificationRunner;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Verify an app deployment on the iOS Simulator.
#[derive(Parser)]
#[command(name = "simverify")]
#[command(about = "Verify that an app is built, bundled, installed and launches on the iOS Simulator")]
#[command(version)]
struct Cli {
    /// Check sequence to run
    #[arg(short, long, value_enum, default_value = "complete", env = "SIMVERIFY_MODE")]
    mode: ModeArg,

    /// Simulator UDID to verify against
    #[arg(short, long, env = "SIMVERIFY_SIMULATOR")]
    simulator: Option<String>,

    /// Bundle identifier of the app under test
    #[arg(short, long, env = "SIMVERIFY_BUNDLE_ID")]
    bundle_id: Option<String>,

    /// Directory containing the source model assets
    #[arg(long, env = "SIMVERIFY_ASSETS_DIR")]
    assets_dir: Option<PathBuf>,

    /// Path to the built .app (discovered when omitted)
    #[arg(long, env = "SIMVERIFY_APP_PATH")]
    app_path: Option<PathBuf>,

    /// Config file (defaults to ~/.simverify/config.json)
    #[arg(short, long, env = "SIMVERIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Per-command timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Output format: text or json
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Write logs to simverify.log in this directory instead of stderr
    #[arg(long, env = "SIMVERIFY_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ModeArg {
    Basic,
    Complete,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Basic => Mode::Basic,
            ModeArg::Complete => Mode::Complete,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_dir.as_ref());

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };
    debug!(?config, "Resolved configuration");

    let mode = Mode::from(cli.mode);
    let out: Box<dyn Write> = match cli.format {
        OutputFormat::Text => Box::new(std::io::stdout()),
        OutputFormat::Json => Box::new(std::io::sink()),
    };

    let mut runner = VerificationRunner::new(config, SystemRunner, out);
    let summary = runner.run(mode);

    if cli.format == OutputFormat::Json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_logging(log_dir: Option<&PathBuf>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, "simverify.log");
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file_appender)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Config file values, then command-line and environment overrides.
fn resolve_config(cli: &Cli) -> Result<VerifyConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => VerifyConfig::load_from(path)?,
        None => VerifyConfig::load(),
    };

    if let Some(simulator) = &cli.simulator {
        config.simulator_id = simulator.clone();
    }
    if let Some(bundle_id) = &cli.bundle_id {
        config.bundle_id = bundle_id.clone();
    }
    if let Some(assets_dir) = &cli.assets_dir {
        config.assets_dir = assets_dir.clone();
    }
    if let Some(app_path) = &cli.app_path {
        config.app_path = Some(app_path.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.command_timeout_secs = timeout;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn no_arguments_means_complete_text_run() {
        let cli = Cli::try_parse_from(["simverify"]).unwrap();
        assert!(cli.mode == ModeArg::Complete);
        assert!(cli.format == OutputFormat::Text);
        assert!(cli.config.is_none());
    }

    #[test]
    fn overrides_apply_on_top_of_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"simulator_id": "FROM-FILE", "bundle_id": "file.bundle"}"#).unwrap();

        let cli = Cli::try_parse_from([
            "simverify",
            "--config",
            path.to_str().unwrap(),
            "--bundle-id",
            "cli.bundle",
            "--timeout",
            "7",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();

        assert_eq!(config.simulator_id, "FROM-FILE");
        assert_eq!(config.bundle_id, "cli.bundle");
        assert_eq!(config.command_timeout_secs, 7);
    }

    #[test]
    fn mode_arg_maps_to_core_mode() {
        assert_eq!(Mode::from(ModeArg::Basic), Mode::Basic);
        assert_eq!(Mode::from(ModeArg::Complete), Mode::Complete);
    }
}
