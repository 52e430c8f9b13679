//! climb — explore any command-line tool's `--help` tree and run it safely.
//!
//! Three subcommands:
//! - `climb discover`: scan `PATH` for introspectable CLIs
//! - `climb tree <cli>`: print the discovered command tree for one CLI
//! - `climb run <cli> -- <args>`: execute a CLI inside the sandboxed runner

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use climb::{discover, discover_one, run, DiscoverOptions, Introspector, RunOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "climb", version, about = "Explore and run any CLI tool's --help surface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan PATH for introspectable command-line tools.
    Discover {
        /// Only show candidates scoring at least this high.
        #[arg(long, default_value_t = -5)]
        min_score: i32,
        /// Cap the number of results shown.
        #[arg(long)]
        limit: Option<usize>,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print the discovered command tree for a single CLI.
    Tree {
        /// Name of the CLI, as it appears on PATH.
        name: String,
        /// Command path to expand into (space-separated, e.g. "remote add").
        #[arg(long)]
        path: Vec<String>,
        /// Emit JSON instead of an indented tree.
        #[arg(long)]
        json: bool,
    },
    /// Run a CLI inside the sandboxed executor.
    Run {
        /// Name or path of the CLI to run.
        name: String,
        /// Arguments to pass through, e.g. `climb run git -- status --short`.
        #[arg(last = true)]
        args: Vec<String>,
        /// Timeout in milliseconds.
        #[arg(long, default_value_t = 5_000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Discover { min_score, limit, json } => run_discover(min_score, limit, json).await,
        Commands::Tree { name, path, json } => run_tree(name, path, json).await,
        Commands::Run { name, args, timeout_ms } => run_exec(name, args, timeout_ms).await,
    }
}

async fn run_discover(min_score: i32, limit: Option<usize>, json: bool) -> Result<()> {
    let path_var = std::env::var("PATH").unwrap_or_default();
    let opts = DiscoverOptions {
        min_score,
        limit,
        ..DiscoverOptions::default()
    };

    let results = discover(&path_var, &opts, None).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for cli in &results {
        println!(
            "{:<20} score={:<5} help={:<5} {}",
            cli.name,
            cli.score,
            cli.has_help,
            cli.path.display()
        );
    }
    tracing::info!(count = results.len(), "discovery complete");
    Ok(())
}

async fn resolve_executable(name: &str) -> Result<PathBuf> {
    if name.contains('/') || name.contains('\\') {
        return Ok(PathBuf::from(name));
    }
    let path_var = std::env::var("PATH").unwrap_or_default();
    if let Some(found) = discover_one(name, &DiscoverOptions::default()).await {
        return Ok(found.path);
    }
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
        .ok_or_else(|| anyhow!("'{}' not found on PATH", name))
}

async fn run_tree(name: String, path: Vec<String>, json: bool) -> Result<()> {
    let executable = resolve_executable(&name).await?;
    let introspector = Introspector::default();
    let node = introspector
        .expand(&name, &executable.to_string_lossy(), &path)
        .await
        .with_context(|| format!("failed to introspect '{name}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&node)?);
        return Ok(());
    }

    print_tree(&node, 0);
    Ok(())
}

fn print_tree(node: &climb::CommandNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let desc = node.description.as_deref().unwrap_or("");
    println!("{indent}{} {}", node.name, desc);
    for option in &node.options {
        let flag = option
            .long
            .clone()
            .or_else(|| option.short.clone())
            .unwrap_or_default();
        println!("{indent}  [{flag}]");
    }
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

async fn run_exec(name: String, args: Vec<String>, timeout_ms: u64) -> Result<()> {
    let executable = resolve_executable(&name).await?;
    let opts = RunOptions {
        timeout: std::time::Duration::from_millis(timeout_ms),
        ..RunOptions::default()
    };

    let result = run(&executable.to_string_lossy(), &args, &opts)
        .await
        .with_context(|| format!("failed to run '{name}'"))?;

    print!("{}", result.stdout);
    eprint!("{}", result.stderr);

    if result.timed_out {
        return Err(anyhow!("'{}' timed out after {}ms", name, timeout_ms));
    }

    std::process::exit(result.exit_code.unwrap_or(1));
}
