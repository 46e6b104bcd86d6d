//! Operator commands for inspecting archived packs and persisted tokens.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use syncpack_core::pipeline::{standard_progress, OperationMode, ResumptionToken, StepStatus};
use syncpack_core::{ArchiveStore, Config};

#[derive(Parser, Debug)]
#[command(name = "syncpack")]
#[command(about = "Inspect sync pack archives and resumption tokens")]
pub struct Cli {
    /// Content root (defaults to $SYNCPACK_ROOT or the local data directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List archived packs
    List,
    /// Show where a persisted token is in its operation
    Status {
        /// Token JSON file
        token: PathBuf,
        /// Operation the token belongs to
        #[arg(long, value_parser = parse_mode)]
        mode: OperationMode,
    },
}

fn parse_mode(s: &str) -> Result<OperationMode, String> {
    s.parse::<OperationMode>().map_err(|e| e.to_string())
}

/// Initialize tracing/logging with the given directives
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive '{}': {}", directive, e),
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn run(cli: Cli) -> Result<()> {
    let config = match cli.root {
        Some(root) => Config::with_root(root),
        None => Config::load_or_default(),
    };
    tracing::debug!("Content root: {:?}", config.content_root);

    match cli.command {
        Command::List => {
            let packs = list_packs(&config.archive_store());
            if packs.is_empty() {
                println!("No packs in {}", config.exports_dir.display());
            }
            for pack in packs {
                println!("{}", pack);
            }
        }
        Command::Status { token, mode } => {
            print!("{}", status(&token, mode)?);
        }
    }
    Ok(())
}

/// Archived pack ids, sorted.
pub fn list_packs(archive: &ArchiveStore) -> Vec<String> {
    let mut packs: Vec<String> = archive.list().collect();
    packs.sort();
    packs
}

/// Human-readable position of the token stored at `path`.
pub fn status(path: &Path, mode: OperationMode) -> Result<String> {
    let token = ResumptionToken::read_from(path)
        .with_context(|| format!("Failed to load token from {}", path.display()))?;
    Ok(describe(&token, mode))
}

fn describe(token: &ResumptionToken, mode: OperationMode) -> String {
    let progress = standard_progress(mode, token.step_index, token.create_restore_point);

    let mut out = String::new();
    let id = token
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "(not started)".to_string());
    let _ = writeln!(out, "Operation: {}", id);
    if !token.name.is_empty() {
        let _ = writeln!(out, "Name:      {}", token.name);
    }
    let _ = writeln!(out, "Mode:      {}", mode);
    let _ = writeln!(
        out,
        "Progress:  {}/{} ({:.0}%)",
        progress.current_visible_index,
        progress.total_visible_steps,
        progress.percent * 100.0
    );
    if !progress.is_complete() {
        let _ = writeln!(out, "Page:      {}", token.pack.page_number);
    }
    for step in &progress.steps {
        let marker = match step.status {
            StepStatus::Complete => "x",
            StepStatus::Current => ">",
            StepStatus::Pending => " ",
        };
        let _ = writeln!(out, "  [{}] {}", marker, step.name);
    }
    out
}
