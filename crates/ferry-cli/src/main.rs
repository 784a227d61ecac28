//! Ferry command-line tool
//!
//! Inspects the reflected library types and runs demonstration scenarios
//! against a host context.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ferry_runtime::RuntimeOptions;

use commands::demo::Scenario;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Reflection-driven native bridge toolkit", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Worker thread count (overrides the config file)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version, platform and effective settings
    Info,

    /// Print the reflection descriptors of the library types
    Describe {
        /// Only this type
        type_name: Option<String>,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a demonstration scenario against a host
    Demo {
        /// Scenario to run
        #[arg(value_enum, default_value_t = Scenario::All)]
        scenario: Scenario,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_options(cli: &Cli) -> anyhow::Result<RuntimeOptions> {
    let options = match &cli.config {
        Some(path) => RuntimeOptions::load(path)?,
        None => RuntimeOptions::default(),
    };
    Ok(match cli.threads {
        Some(threads) => options.with_threads(threads),
        None => options,
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let options = load_options(&cli)?;

    match cli.command {
        Commands::Info => commands::info::execute(&options, cli.config.as_deref()),
        Commands::Describe { type_name, json } => {
            commands::describe::execute(type_name.as_deref(), json)
        }
        Commands::Demo { scenario } => commands::demo::execute(&options, scenario),
    }
}
