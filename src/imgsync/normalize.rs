use crate::error::ImgsyncError;
use crate::imgsync::config::IngestConfig;
use crate::imgsync::paths::ImgsyncPaths;
use crate::imgsync::util::{encode_jpeg, write_atomic};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

const NAME_HASH_CHARS: usize = 15;

static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"20[0-9]{2}-[0-1][0-9]-[0-3][0-9]").expect("date pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Jpeg,
    Convert,
}

#[derive(Debug, Clone)]
pub struct NormalizedFile {
    pub source: PathBuf,
    pub target: PathBuf,
    pub converted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub normalized: Vec<NormalizedFile>,
}

fn lower_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|v| v.to_str())
        .map(str::to_ascii_lowercase)
}

fn source_format(path: &Path) -> Result<SourceFormat> {
    match lower_extension(path).as_deref() {
        Some("jpg" | "jpeg") => Ok(SourceFormat::Jpeg),
        Some("png" | "webp") => Ok(SourceFormat::Convert),
        _ => Err(ImgsyncError::UnsupportedFormat(path.to_path_buf()).into()),
    }
}

fn is_allowed(path: &Path) -> bool {
    lower_extension(path).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// First `20YY-MM-DD` shaped token anywhere in `name`.
pub fn find_date_token(name: &str) -> Option<&str> {
    DATE_TOKEN.find(name).map(|m| m.as_str())
}

pub fn synthesized_token(now: &DateTime<Local>) -> String {
    now.format("%Y-%m-%dT%H%M%S").to_string()
}

fn content_prefix(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hex = format!("{:x}", hasher.finalize());
    hex[..NAME_HASH_CHARS].to_string()
}

fn with_jpg_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((base, _)) => format!("{base}.jpg"),
        None => format!("{name}.jpg"),
    }
}

/// Date token and archive file name for a source called `file_name`.
/// `bytes` is only consulted when the name carries no date.
pub fn canonical_name(
    file_name: &str,
    bytes: impl FnOnce() -> Result<Vec<u8>>,
    now: &DateTime<Local>,
) -> Result<(String, String)> {
    if let Some(token) = find_date_token(file_name) {
        return Ok((token.to_string(), with_jpg_extension(file_name)));
    }
    let token = synthesized_token(now);
    let name = format!("{token}_{}{file_name}", content_prefix(&bytes()?));
    Ok((token.clone(), with_jpg_extension(&name)))
}

fn dated_target(archive_dir: &Path, token: &str, name: &str) -> PathBuf {
    archive_dir
        .join(&token[0..4])
        .join(&token[5..7])
        .join(name)
}

fn file_name_str(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|v| v.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))
}

fn skipped(name: &str, cfg: &IngestConfig) -> bool {
    name.starts_with('.') || cfg.skip_prefixes.iter().any(|p| name.starts_with(p.as_str()))
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Every source of this batch. The upload directory must hold nothing but
/// allow-listed images; the archive top level and the root also hold other
/// files, so only allow-listed ones are picked up there.
pub fn collect_sources(paths: &ImgsyncPaths, cfg: &IngestConfig) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in list_files(&paths.upload_dir)? {
        let name = file_name_str(&path)?;
        if skipped(name, cfg) {
            continue;
        }
        if !is_allowed(&path) {
            return Err(ImgsyncError::UnsupportedFormat(path).into());
        }
        out.push(path);
    }

    for dir in [&paths.archive_dir, &paths.root] {
        if *dir == paths.upload_dir {
            continue;
        }
        for path in list_files(dir)? {
            let name = file_name_str(&path)?;
            if !skipped(name, cfg) && is_allowed(&path) && !out.contains(&path) {
                out.push(path);
            }
        }
    }
    Ok(out)
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match fs::rename(from, to) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            let bytes =
                fs::read(from).with_context(|| format!("failed to read {}", from.display()))?;
            write_atomic(to, &bytes)?;
            fs::remove_file(from).with_context(|| format!("failed to remove {}", from.display()))
        }
        Err(err) => Err(err)
            .with_context(|| format!("failed to move {} to {}", from.display(), to.display())),
    }
}

pub fn normalize_file(
    paths: &ImgsyncPaths,
    cfg: &IngestConfig,
    source: &Path,
    now: &DateTime<Local>,
) -> Result<NormalizedFile> {
    let format = source_format(source)?;
    let file_name = file_name_str(source)?;
    let read_source =
        || fs::read(source).with_context(|| format!("failed to read {}", source.display()));
    let (token, name) = canonical_name(file_name, read_source, now)?;
    let target = dated_target(&paths.archive_dir, &token, &name);

    info!(
        "{} -> {}",
        source.display(),
        target.display()
    );

    match format {
        SourceFormat::Jpeg => move_file(source, &target)?,
        SourceFormat::Convert => {
            let bytes = read_source()?;
            let img = image::load_from_memory(&bytes).map_err(|err| ImgsyncError::Decode {
                path: source.to_path_buf(),
                reason: err.to_string(),
            })?;
            write_atomic(&target, &encode_jpeg(&img, cfg.jpeg_quality)?)?;
            fs::remove_file(source)
                .with_context(|| format!("failed to remove {}", source.display()))?;
        }
    }

    Ok(NormalizedFile {
        source: source.to_path_buf(),
        target,
        converted: format == SourceFormat::Convert,
    })
}

pub fn ingest_uploads(paths: &ImgsyncPaths, cfg: &IngestConfig) -> Result<IngestOutcome> {
    let sources = collect_sources(paths, cfg)?;
    let mut out = IngestOutcome::default();
    for source in sources {
        let normalized = normalize_file(paths, cfg, &source, &Local::now())?;
        out.normalized.push(normalized);
    }
    Ok(out)
}
