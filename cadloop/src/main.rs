//! `cadloop` command line.
//!
//! `run` drives the full design loop from `cadloop.toml`; `validate` and
//! `exec` expose the validation pipeline and the sandbox on their own.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use cadloop::core::cancel::CancelToken;
use cadloop::core::types::DesignGoal;
use cadloop::exit_codes;
use cadloop::io::config::{CadloopConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use cadloop::io::sandbox::Sandbox;
use cadloop::logging;
use cadloop::session::{self, ExecSummary, RunSummary};
use cadloop::validate::Validator;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "cadloop",
    version,
    about = "Bounded design and coding loops for CAD code synthesis"
)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the design loop for a goal and print a JSON summary.
    Run {
        /// Natural-language design goal.
        goal: String,
        /// Reference image (repeatable).
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Directory receiving goal records and iteration directories.
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Override `design.max_iterations`.
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Override `design.stop_threshold`.
        #[arg(long)]
        stop_threshold: Option<f64>,
    },
    /// Run the static validation pipeline on a program file.
    Validate { file: PathBuf },
    /// Execute a program file once in the sandbox.
    Exec {
        file: PathBuf,
        /// Timeout in seconds (defaults to `coding.test_timeout_secs`).
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    logging::init("info");
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            goal,
            images,
            output_dir,
            max_iterations,
            stop_threshold,
        } => {
            let mut cfg = load_config(&cli.config)?;
            if let Some(n) = max_iterations {
                cfg.design.max_iterations = n;
            }
            if let Some(threshold) = stop_threshold {
                cfg.design.stop_threshold = threshold;
            }
            cfg.validate().context("invalid command line overrides")?;
            cmd_run(&cfg, DesignGoal::new(goal).with_images(images), &output_dir)
        }
        Command::Validate { file } => cmd_validate(&load_config(&cli.config)?, &file),
        Command::Exec { file, timeout } => cmd_exec(&load_config(&cli.config)?, &file, timeout),
        Command::InitConfig { force } => cmd_init_config(&cli.config, force),
    }
}

fn cmd_run(cfg: &CadloopConfig, goal: DesignGoal, output_dir: &Path) -> Result<i32> {
    let design = session::design_loop(cfg, output_dir, CancelToken::new())?;
    let outcome = design.run(
        &goal,
        output_dir,
        cfg.design.max_iterations,
        cfg.design.stop_threshold,
    )?;
    // Dropping the loop flushes pending history records.
    drop(design);

    let summary = RunSummary::from_outcome(&outcome, output_dir);
    let json = to_json(&summary)?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("create {}", output_dir.display()))?;
    fs::write(output_dir.join("summary.json"), format!("{json}\n"))
        .with_context(|| format!("write summary to {}", output_dir.display()))?;
    println!("{json}");
    Ok(if outcome.completed {
        exit_codes::OK
    } else {
        exit_codes::NOT_ACHIEVED
    })
}

fn cmd_validate(cfg: &CadloopConfig, file: &Path) -> Result<i32> {
    let candidate = read_program(file)?;
    let pipeline = session::validation_pipeline(cfg)?;
    let result = pipeline.validate(&candidate);
    println!("{}", to_json(&result)?);
    Ok(if result.ok {
        exit_codes::OK
    } else {
        exit_codes::NOT_ACHIEVED
    })
}

fn cmd_exec(cfg: &CadloopConfig, file: &Path, timeout: Option<u64>) -> Result<i32> {
    let candidate = read_program(file)?;
    let timeout_secs = timeout.unwrap_or(cfg.coding.test_timeout_secs);
    if timeout_secs == 0 {
        bail!("--timeout must be > 0");
    }
    let sandbox = session::sandbox(cfg)?;
    let result = sandbox.execute(&candidate, Duration::from_secs(timeout_secs));
    println!("{}", to_json(&ExecSummary::from(&result))?);
    Ok(if result.is_success() {
        exit_codes::OK
    } else {
        exit_codes::NOT_ACHIEVED
    })
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &CadloopConfig::default())?;
    info!(path = %path.display(), "wrote default config");
    Ok(exit_codes::OK)
}

fn read_program(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serialize json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "cadloop",
            "run",
            "a 40mm cube",
            "--image",
            "a.png",
            "--image",
            "b.png",
            "--max-iterations",
            "3",
            "--stop-threshold",
            "0.5",
        ]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        match cli.command {
            Command::Run {
                goal,
                images,
                output_dir,
                max_iterations,
                stop_threshold,
            } => {
                assert_eq!(goal, "a 40mm cube");
                assert_eq!(images, vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
                assert_eq!(output_dir, PathBuf::from("output"));
                assert_eq!(max_iterations, Some(3));
                assert_eq!(stop_threshold, Some(0.5));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_exec_with_global_config() {
        let cli = Cli::parse_from(["cadloop", "exec", "part.py", "--timeout", "5", "--config", "x.toml"]);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(
            cli.command,
            Command::Exec { timeout: Some(5), .. }
        ));
    }

    #[test]
    fn parse_init_config_force() {
        let cli = Cli::parse_from(["cadloop", "init-config", "-f"]);
        assert!(matches!(cli.command, Command::InitConfig { force: true }));
    }

    #[test]
    fn init_config_refuses_to_overwrite() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cadloop.toml");
        assert_eq!(cmd_init_config(&path, false).expect("first write"), exit_codes::OK);
        assert!(cmd_init_config(&path, false).is_err());
        assert_eq!(cmd_init_config(&path, true).expect("forced"), exit_codes::OK);
    }
}
