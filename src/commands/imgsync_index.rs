use anyhow::Result;

use crate::commands::CommandReport;
use crate::imgsync::config::ImgsyncConfig;
use crate::imgsync::index::update_indexes;
use crate::imgsync::paths::ImgsyncPaths;
use crate::imgsync::thumbnails::update_thumbnails;

/// Index Maintainer followed by the Thumbnail Builder.
pub fn run_with(paths: &ImgsyncPaths, cfg: &ImgsyncConfig) -> Result<CommandReport> {
    let mut report = CommandReport::new("index");

    let indexes = update_indexes(paths)?;
    report.detail(format!("index.directories={}", indexes.directories));
    report.detail(format!("index.images={}", indexes.images));
    report.detail(format!("index.decoded={}", indexes.decoded));
    report.detail(format!("index.dir_index_written={}", indexes.dir_index_written));
    report.detail(format!(
        "index.entry_indexes_written={}",
        indexes.entry_indexes_written.len()
    ));

    let thumbnails = update_thumbnails(&paths.archive_dir, cfg.thumbnails.jpeg_quality)?;
    report.detail(format!("thumbnails.checked={}", thumbnails.checked));
    report.detail(format!("thumbnails.rebuilt={}", thumbnails.rebuilt.len()));
    for path in &thumbnails.rebuilt {
        report.detail(format!("thumbnails.path={}", path.display()));
    }

    Ok(report)
}

pub fn run() -> Result<CommandReport> {
    let paths = crate::imgsync::paths::resolve_paths()?;
    let cfg = crate::imgsync::config::load_config(&paths)?;
    run_with(&paths, &cfg)
}
