use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const ARCHIVE_DIR_NAME: &str = "archive";
pub const UPLOAD_DIR_NAME: &str = "upload";
pub const CACHE_FILE_NAME: &str = "dedup_cache.json";
pub const CONFIG_FILE_NAME: &str = "imgsync.toml";

pub const ENTRY_INDEX_NAME: &str = "entry_index.json";
pub const DIR_INDEX_NAME: &str = "dir_index.json";
pub const THUMBNAILS_NAME: &str = "thumbnails.jpg";

#[derive(Debug, Clone)]
pub struct ImgsyncPaths {
    pub root: PathBuf,
    pub archive_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub cache_file: PathBuf,
}

impl ImgsyncPaths {
    pub fn under(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            archive_dir: root.join(ARCHIVE_DIR_NAME),
            upload_dir: root.join(UPLOAD_DIR_NAME),
            cache_file: root.join(CACHE_FILE_NAME),
        }
    }

    pub fn dir_index_file(&self) -> PathBuf {
        self.archive_dir.join(DIR_INDEX_NAME)
    }

    /// `archive/<YYYY>/<MM>/<name>`; the year and month come from the date
    /// token the canonical name starts with.
    pub fn dated_path(&self, file_name: &str) -> Option<PathBuf> {
        let digits = file_name.replace('-', "");
        let year = digits.get(0..4)?;
        let month = digits.get(4..6)?;
        Some(self.archive_dir.join(year).join(month).join(file_name))
    }
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<ImgsyncPaths> {
    let cwd = env::current_dir().context("current directory could not be resolved")?;
    let root = env_or_default_path("IMGSYNC_HOME", cwd);
    let defaults = ImgsyncPaths::under(&root);

    Ok(ImgsyncPaths {
        archive_dir: env_or_default_path("IMGSYNC_ARCHIVE_DIR", defaults.archive_dir),
        upload_dir: env_or_default_path("IMGSYNC_UPLOAD_DIR", defaults.upload_dir),
        cache_file: env_or_default_path("IMGSYNC_CACHE_FILE", defaults.cache_file),
        root,
    })
}
