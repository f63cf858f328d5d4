//! DevAIFlow CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use daf_cli::cli::Cli;
use daf_cli::{commands, output};

/// Environment variable enabling verbose diagnostics.
const DEBUG_ENV: &str = "DEVAIFLOW_DEBUG";

fn main() {
    let cli = Cli::parse();

    // Load <root>/.env before anything reads the environment
    let _ = dotenvy::from_path(cli.home().join(".env"));

    let debug = std::env::var(DEBUG_ENV).is_ok_and(|v| v == "1");
    let default_level = if debug { "debug" } else { cli.log_level() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    let code = match commands::execute(cli) {
        Ok(result) => {
            if json {
                println!("{}", output::success(result.data));
            } else if !result.human.is_empty() {
                println!("{}", result.human);
            }
            0
        }
        Err(e) => {
            if json {
                println!("{}", output::failure(&e));
            } else {
                eprintln!("error: {}", e);
                if debug {
                    eprintln!("{:?}", e);
                }
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}
