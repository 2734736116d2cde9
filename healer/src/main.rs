//! Self-healing code generation CLI.
//!
//! `healer run` asks a generator for a Python program, runs it in a fresh
//! interpreter process, and repairs it from its own error output until it
//! succeeds or the retry budget is spent.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use healer::core::extract::Generation;
use healer::core::types::{ExecutionResult, Outcome};
use healer::driver::{DriverConfig, RunEvent, run_task};
use healer::error::RunError;
use healer::exit_codes;
use healer::io::config::{DEFAULT_CONFIG_FILE, HealerConfig, load_config, write_config};
use healer::io::executor::Executor;

#[derive(Parser)]
#[command(
    name = "healer",
    version,
    about = "Generate, run and repair small programs until they work"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `healer.toml`.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Solve a task with the generate-execute-repair loop.
    Run {
        /// Natural-language task description.
        task: String,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Override `retry_budget`.
        #[arg(long)]
        budget: Option<u32>,
        /// Override `attempt_timeout_secs`.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Print only the final report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run one program through the executor (`-` reads stdin).
    Exec {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Print the program extracted from generated text (stdin by default).
    Extract { file: Option<PathBuf> },
}

fn main() {
    healer::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Run {
            task,
            config,
            budget,
            timeout_secs,
            json,
        } => cmd_run(&task, &config, budget, timeout_secs, json),
        Command::Exec {
            file,
            config,
            timeout_secs,
            json,
        } => cmd_exec(&file, &config, timeout_secs, json),
        Command::Extract { file } => cmd_extract(file.as_deref()),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &HealerConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    task: &str,
    config_path: &Path,
    budget: Option<u32>,
    timeout_secs: Option<u64>,
    json: bool,
) -> Result<i32> {
    if task.trim().is_empty() {
        bail!("task must not be empty");
    }
    let cfg = load_with_overrides(config_path, budget, timeout_secs)?;
    let generator = cfg.build_generator();
    let executor = cfg.build_executor()?;
    let driver_config = DriverConfig::from(&cfg);

    if !json {
        println!("note: {}", executor.limitation());
    }
    let state = match run_task(task, &generator, &executor, &driver_config, |event| {
        if !json {
            print_event(event);
        }
    }) {
        Ok(state) => state,
        Err(RunError::ConfigurationMissing { what }) => {
            eprintln!("configuration missing: {what}");
            return Ok(exit_codes::CONFIG_MISSING);
        }
        Err(err) => return Err(err.into()),
    };

    let report = state.report();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
    } else if let Some(program) = &report.program {
        println!("=== final program ===\n{program}");
    }
    Ok(match report.outcome {
        Some(Outcome::Success) => exit_codes::OK,
        _ => exit_codes::EXHAUSTED,
    })
}

fn cmd_exec(file: &Path, config_path: &Path, timeout_secs: Option<u64>, json: bool) -> Result<i32> {
    let cfg = load_with_overrides(config_path, None, timeout_secs)?;
    let program = read_input(Some(file))?;
    let executor = cfg.build_executor()?;
    let result = executor.execute(&program, cfg.attempt_timeout())?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("serialize result")?
        );
    } else {
        print_result(&result);
    }
    Ok(if result.succeeded {
        exit_codes::OK
    } else {
        exit_codes::EXHAUSTED
    })
}

fn cmd_extract(file: Option<&Path>) -> Result<i32> {
    let text = read_input(file)?;
    let generation = Generation::parse(text)?;
    println!("{}", generation.program());
    Ok(exit_codes::OK)
}

fn load_with_overrides(
    path: &Path,
    budget: Option<u32>,
    timeout_secs: Option<u64>,
) -> Result<HealerConfig> {
    let mut cfg = load_config(path)?;
    if let Some(budget) = budget {
        cfg.retry_budget = budget;
    }
    if let Some(timeout_secs) = timeout_secs {
        cfg.attempt_timeout_secs = timeout_secs;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Read a file, or stdin when the path is absent or `-`.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read stdin")?;
            Ok(buf)
        }
    }
}

fn print_event(event: &RunEvent<'_>) {
    match event {
        RunEvent::Generated {
            attempt,
            repair,
            program,
        } => {
            let kind = if *repair { "repair" } else { "plan" };
            println!("=== attempt {attempt} ({kind}) ===\n{program}");
        }
        RunEvent::Executed { result, .. } => print_result(result),
        RunEvent::Repairing { attempt, budget } => {
            println!("--- attempt {attempt} of {budget} failed, repairing ---");
        }
        RunEvent::Done { outcome, attempts } => {
            let outcome = match outcome {
                Outcome::Success => "success",
                Outcome::Exhausted => "retry budget exhausted",
            };
            println!("=== {outcome} after {attempts} attempt(s) ===");
        }
    }
}

fn print_result(result: &ExecutionResult) {
    println!("--- exit: {} ---", result.exit_reason.as_str());
    if !result.stdout.is_empty() {
        println!("[stdout]\n{}", result.stdout.trim_end());
    }
    if !result.stderr.is_empty() {
        println!("[stderr]\n{}", result.stderr.trim_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["healer", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false, .. }));
    }

    #[test]
    fn parse_run_overrides() {
        let cli = Cli::parse_from([
            "healer",
            "run",
            "compute 6 factorial",
            "--budget",
            "5",
            "--timeout-secs",
            "2",
            "--json",
        ]);
        match cli.command {
            Command::Run {
                task,
                budget,
                timeout_secs,
                json,
                config,
            } => {
                assert_eq!(task, "compute 6 factorial");
                assert_eq!(budget, Some(5));
                assert_eq!(timeout_secs, Some(2));
                assert!(json);
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_FILE));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_extract_defaults_to_stdin() {
        let cli = Cli::parse_from(["healer", "extract"]);
        assert!(matches!(cli.command, Command::Extract { file: None }));
    }

    #[test]
    fn overrides_are_validated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("healer.toml");
        let cfg = load_with_overrides(&path, Some(7), Some(3)).expect("load");
        assert_eq!(cfg.retry_budget, 7);
        assert_eq!(cfg.attempt_timeout_secs, 3);
        assert!(load_with_overrides(&path, Some(0), None).is_err());
    }
}
