//! Build automation tasks for the pool-bench workspace.
//!
//! Run with `cargo xtask <command>`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for pool-bench")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Format check, then lint and test with and without the postgres backend
    Ci,
    /// Lint every target
    Clippy {
        /// Include the PostgreSQL backend
        #[arg(long)]
        postgres: bool,
    },
    /// Run the test suites
    Test {
        /// Include the PostgreSQL backend
        #[arg(long)]
        postgres: bool,
    },
    /// Run the pool micro-benchmarks
    Bench,
    /// Run the pooled vs. unpooled benchmark (release build)
    Run {
        /// Include the PostgreSQL backend
        #[arg(long)]
        postgres: bool,
        /// Arguments passed through to pool-bench
        #[arg(last = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(workspace_root()?);

    match cli.command {
        Command::Ci => {
            cmd!(sh, "cargo fmt --all -- --check").run()?;
            for postgres in [false, true] {
                clippy(&sh, postgres)?;
                test(&sh, postgres)?;
            }
            println!("CI checks passed.");
        }
        Command::Clippy { postgres } => clippy(&sh, postgres)?,
        Command::Test { postgres } => test(&sh, postgres)?,
        Command::Bench => cmd!(sh, "cargo bench -p connpool").run()?,
        Command::Run { postgres, args } => {
            let features = features(postgres);
            cmd!(sh, "cargo run --release -p pool-bench {features...} -- {args...}").run()?;
        }
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;
    let manifest = String::from_utf8(output.stdout).context("invalid UTF-8 in cargo output")?;

    PathBuf::from(manifest.trim())
        .parent()
        .map(PathBuf::from)
        .context("manifest path has no parent directory")
}

/// Cargo flags enabling the PostgreSQL backend of pool-bench.
fn features(postgres: bool) -> &'static [&'static str] {
    if postgres {
        &["--features", "pool-bench/postgres"]
    } else {
        &[]
    }
}

fn clippy(sh: &Shell, postgres: bool) -> Result<()> {
    let features = features(postgres);
    cmd!(sh, "cargo clippy --workspace --all-targets {features...} -- -D warnings").run()?;
    Ok(())
}

fn test(sh: &Shell, postgres: bool) -> Result<()> {
    let features = features(postgres);
    cmd!(sh, "cargo test --workspace {features...}").run()?;
    Ok(())
}
