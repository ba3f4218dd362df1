use anyhow::Result;

use crate::channel::http::HttpChannelClient;
use crate::commands::CommandReport;
use crate::imgsync::config::load_config;
use crate::imgsync::paths::resolve_paths;
use crate::imgsync::sync::run_sync;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config(&paths)?;
    let client = HttpChannelClient::from_config(&cfg.sync)?;
    let mut report = CommandReport::new("sync");

    report.detail(format!("sync.channel={}", cfg.sync.channel));
    report.detail(format!("sync.cache_file={}", paths.cache_file.display()));

    let out = run_sync(&paths, &cfg.sync, &client)?;
    report.detail(format!("sync.min_id={}", out.min_id));
    report.detail(format!("sync.sampled={}", out.sampled));
    report.detail(format!("sync.fetched={}", out.fetched));
    report.detail(format!("sync.skipped={}", out.skipped));
    report.detail(format!("sync.refreshed={}", out.refreshed));
    report.detail(format!("sync.duplicates={}", out.duplicates));
    report.detail(format!("sync.missing={}", out.missing));
    report.detail(format!("sync.written={}", out.written.len()));
    for path in &out.written {
        report.detail(format!("sync.path={}", path.display()));
    }
    report.detail(format!("sync.cache_records={}", out.cache_records));
    report.detail(format!("sync.cache_written={}", out.cache_written));

    Ok(report)
}
