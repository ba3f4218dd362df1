use anyhow::Result;

use crate::commands::{CommandReport, imgsync_index};
use crate::imgsync::config::load_config;
use crate::imgsync::normalize::ingest_uploads;
use crate::imgsync::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config(&paths)?;
    let mut report = CommandReport::new("ingest");

    let ingested = ingest_uploads(&paths, &cfg.ingest)?;
    report.detail(format!("ingest.normalized={}", ingested.normalized.len()));
    report.detail(format!(
        "ingest.converted={}",
        ingested.normalized.iter().filter(|f| f.converted).count()
    ));
    for file in &ingested.normalized {
        report.detail(format!(
            "ingest.file={} -> {}",
            file.source.display(),
            file.target.display()
        ));
    }

    report.merge(imgsync_index::run_with(&paths, &cfg)?);
    Ok(report)
}
