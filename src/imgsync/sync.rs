use crate::channel::client::{ChannelClient, ChannelMessage};
use crate::error::ImgsyncError;
use crate::imgsync::config::SyncConfig;
use crate::imgsync::dedup_cache::{DedupCache, RemoteRecord};
use crate::imgsync::fingerprint::{digest_bytes, digest_file};
use crate::imgsync::paths::{ImgsyncPaths, THUMBNAILS_NAME};
use crate::imgsync::util::{is_jpg_name, write_atomic};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use walkdir::WalkDir;

const ELIGIBLE_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub min_id: u64,
    pub sampled: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub refreshed: usize,
    pub duplicates: usize,
    pub missing: usize,
    pub written: Vec<PathBuf>,
    pub cache_records: usize,
    pub cache_written: bool,
}

fn archived_images_newest_first(archive_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
    if !archive_dir.is_dir() {
        return Ok(Vec::new());
    }
    for entry in WalkDir::new(archive_dir) {
        let entry = entry.with_context(|| format!("failed to walk {}", archive_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_jpg_name(name) || name == THUMBNAILS_NAME {
            continue;
        }
        let modified = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .unwrap_or(UNIX_EPOCH);
        files.push((modified, entry.into_path()));
    }
    files.sort_by(|a, b| b.cmp(a));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Fingerprint → file name for the most recently modified archive images,
/// up to `cap` of them. Two of them sharing a fingerprint is fatal.
pub fn build_sample(archive_dir: &Path, cap: usize) -> Result<HashMap<String, String>> {
    let mut sample: HashMap<String, String> = HashMap::new();
    for path in archived_images_newest_first(archive_dir)? {
        if sample.len() >= cap {
            break;
        }
        let name = path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or_default()
            .to_string();
        let digest = digest_file(&path)?;
        if let Some(first) = sample.get(&digest) {
            return Err(ImgsyncError::FingerprintCollision {
                digest,
                first: first.clone(),
                second: name,
            }
            .into());
        }
        sample.insert(digest, name);
    }
    Ok(sample)
}

pub fn remote_file_name(message: &ChannelMessage, digest: &str) -> String {
    format!(
        "{}_{}_{digest}.jpg",
        message.date.format("%Y-%m-%dT%H%M%S"),
        message.id
    )
}

pub fn run_sync(
    paths: &ImgsyncPaths,
    cfg: &SyncConfig,
    client: &impl ChannelClient,
) -> Result<SyncOutcome> {
    let mut cache = DedupCache::load(&paths.cache_file)?;
    let mut dirty = false;
    let mut out = SyncOutcome {
        min_id: cache.min_fetch_id(cfg.lookback),
        ..SyncOutcome::default()
    };

    let sample = build_sample(&paths.archive_dir, cfg.sample_cap)?;
    out.sampled = sample.len();

    let messages = client.iter_messages(&cfg.channel, out.min_id, cfg.page_limit)?;
    out.fetched = messages.len();

    for message in &messages {
        let Some(mime) = message.photo_mime() else {
            out.skipped += 1;
            continue;
        };
        if mime != ELIGIBLE_MIME {
            warn!("invalid mime type {mime} for message {}", message.id);
            out.skipped += 1;
            continue;
        }

        let fwd = message.forward_count();
        let rct = message.reaction_total();
        if cache.contains(message.id) {
            dirty |= cache.refresh_counters(message.id, fwd, rct);
            info!("old: {}", message.id);
            out.refreshed += 1;
            continue;
        }

        let blob = client.download_media(message)?;
        let origin = PathBuf::from(&cfg.channel).join(message.id.to_string());
        let dig = digest_bytes(&blob, &origin)?;
        let file_name = remote_file_name(message, &dig);

        let name = if let Some(existing) = sample.get(&dig) {
            info!("dup detected: {} {dig} {existing}", message.id);
            out.duplicates += 1;
            Some(existing.clone())
        } else if message.id < cfg.historical_threshold {
            info!("missing: {} {dig} {file_name}", message.id);
            out.missing += 1;
            None
        } else {
            let target = paths
                .dated_path(&file_name)
                .with_context(|| format!("no dated path for {file_name}"))?;
            write_atomic(&target, &blob)?;
            info!("new: {} {dig} {}", message.id, target.display());
            out.written.push(target);
            Some(file_name)
        };

        cache.insert(message.id, RemoteRecord { dig, fwd, name, rct });
        dirty = true;
    }

    out.cache_records = cache.len();
    if dirty {
        cache.save(&paths.cache_file)?;
        out.cache_written = true;
    }
    Ok(out)
}
