mod case;
mod cli;
mod config;
mod judge;
mod outcome;
mod report;
mod results;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use healer::io::config::DEFAULT_CONFIG_FILE;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eval", version, about = "Evaluation harness for healer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    List,
    Run {
        #[arg(required = true)]
        case_ids: Vec<String>,
        #[arg(long, default_value_t = 1)]
        runs: u32,
        /// Concurrent runs.
        #[arg(long, default_value_t = 1)]
        jobs: usize,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    Report {
        case_id: String,
    },
    Clean {
        case_id: String,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;
    match cli.command {
        Command::List => cli::list_cases(&repo_root),
        Command::Run {
            case_ids,
            runs,
            jobs,
            config,
        } => cli::run_cases(
            &repo_root,
            &cli::RunOptions {
                case_ids: &case_ids,
                runs,
                jobs,
                config_path: &config,
            },
        ),
        Command::Report { case_id } => cli::report_case(&repo_root, &case_id),
        Command::Clean { case_id } => cli::clean_case(&repo_root, &case_id),
    }
}
