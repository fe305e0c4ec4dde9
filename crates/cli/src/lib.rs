pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "atendia",
    about = "Atendia operator CLI",
    long_about = "Check readiness, apply migrations, load the demo practice, inspect configuration and query availability.",
    after_help = "Examples:\n  atendia doctor --json\n  atendia seed\n  atendia slots 2026-10-19"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo practice configuration; keys already set are kept")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model and channel settings, schema and practice data")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the free appointment slots for a date")]
    Slots {
        #[arg(help = "Date as YYYY-MM-DD")]
        date: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Slots { date } => commands::slots::run(&date),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
