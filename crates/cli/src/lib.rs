pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use parley_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley negotiation operator CLI",
    long_about = "Inspect effective configuration and run negotiation scenarios offline.",
    after_help = "Examples:\n  parley config\n  parley simulate\n  parley simulate --scenario scenarios/demo.json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Load configuration from this file instead of parley.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Print effective configuration values with source attribution as JSON")]
    Config,
    #[command(about = "Drive a negotiation scenario to a terminal state and print the transcript")]
    Simulate {
        #[arg(long, help = "JSON scenario file (parties, constraints, optional policies)")]
        scenario: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = load_options(cli.config);
    init_logging(&options);

    let result = match cli.command {
        Command::Config => commands::config::run(options),
        Command::Simulate { scenario } => commands::simulate::run(options, scenario.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn load_options(config_path: Option<PathBuf>) -> LoadOptions {
    let require_file = config_path.is_some();
    LoadOptions { config_path, require_file, ..LoadOptions::default() }
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(options: &LoadOptions) {
    use tracing::Level;

    let Ok(config) = AppConfig::load(options.clone()) else {
        return;
    };
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(log_level);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
