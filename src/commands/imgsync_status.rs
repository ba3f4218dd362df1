use anyhow::Result;

use crate::commands::CommandReport;
use crate::imgsync::config::load_config;
use crate::imgsync::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config(&paths)?;
    let mut report = CommandReport::new("status");

    report.detail(format!("root={}", paths.root.display()));
    report.detail(format!("archive_dir={}", paths.archive_dir.display()));
    report.detail(format!("upload_dir={}", paths.upload_dir.display()));
    report.detail(format!("cache_file={}", paths.cache_file.display()));
    report.detail(format!("ingest.jpeg_quality={}", cfg.ingest.jpeg_quality));
    report.detail(format!("thumbnails.jpeg_quality={}", cfg.thumbnails.jpeg_quality));
    report.detail(format!("sync.channel={}", cfg.sync.channel));
    report.detail(format!("sync.lookback={}", cfg.sync.lookback));
    report.detail(format!("sync.page_limit={}", cfg.sync.page_limit));
    report.detail(format!("sync.sample_cap={}", cfg.sync.sample_cap));
    report.detail(format!(
        "sync.historical_threshold={}",
        cfg.sync.historical_threshold
    ));
    report.detail(format!(
        "sync.endpoint_configured={}",
        cfg.sync.endpoint.is_some()
    ));

    if !paths.archive_dir.exists() {
        report.issue(format!("missing archive dir ({})", paths.archive_dir.display()));
    }
    if !paths.upload_dir.exists() {
        report.issue(format!("missing upload dir ({})", paths.upload_dir.display()));
    }

    Ok(report)
}
