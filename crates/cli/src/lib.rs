pub mod commands;
pub mod console;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::run::RunArgs;

#[derive(Debug, Parser)]
#[command(
    name = "intentchain",
    about = "Intent-based networking pipeline CLI",
    long_about = "Turn natural-language operator intents into validated UPF deployment plans, \
                  evaluate the monitor stage, and inspect configuration readiness.",
    after_help = "Examples:\n  intentchain\n  intentchain run --only intent_2 --json\n  intentchain monitor --cases demos/monitor_cases.json\n  intentchain doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Read configuration from this TOML file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run operator intents through the upstream stages (default command)")]
    Run(RunArgs),
    #[command(about = "Evaluate the monitor stage against ground-truth policies and observed state")]
    Monitor {
        #[arg(long, value_name = "FILE", default_value = "demos/monitor_cases.json")]
        cases: PathBuf,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, credential readiness, and optionally probe the model endpoint")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
        #[arg(long, help = "Send one small completion request to the configured endpoint")]
        probe: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => commands::run::run(&args, config_path),
        Command::Monitor { cases } => commands::monitor::run(&cases, config_path),
        Command::Config => commands::config::run(config_path),
        Command::Doctor { json, probe } => commands::doctor::run(config_path, json, probe),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
