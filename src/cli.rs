use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{
    CommandReport, imgsync_index, imgsync_ingest, imgsync_status, imgsync_sync,
};

#[derive(Debug, Parser)]
#[command(name = "imgsync", version, about = "Photo archive ingestion, indexing and channel sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Normalize uploads into the dated archive, then rebuild indexes and thumbnails.
    Ingest,
    /// Rebuild entry/dir indexes and stale thumbnail sheets.
    Index,
    /// Fetch recent channel photos into the archive, skipping known content.
    Sync,
    /// Show resolved paths and settings.
    Status,
}

fn dispatch(command: Command) -> Result<CommandReport> {
    match command {
        Command::Ingest => imgsync_ingest::run(),
        Command::Index => imgsync_index::run(),
        Command::Sync => imgsync_sync::run(),
        Command::Status => imgsync_status::run(),
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = dispatch(cli.command.unwrap_or(Command::Ingest))?;
    print!("{}", report.render());
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
