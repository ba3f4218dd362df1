use crate::error::ImgsyncError;
use crate::imgsync::paths::{CONFIG_FILE_NAME, ImgsyncPaths};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub jpeg_quality: u8,
    pub skip_prefixes: Vec<String>,
}

fn default_skip_prefixes() -> Vec<String> {
    vec!["favico".to_string()]
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 95,
            skip_prefixes: default_skip_prefixes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub jpeg_quality: u8,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self { jpeg_quality: 70 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub channel: String,
    pub endpoint: Option<String>,
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    /// Messages this far below the newest cached id are fetched again so
    /// their forward and reaction counters refresh.
    pub lookback: u64,
    pub page_limit: usize,
    pub sample_cap: usize,
    /// Ids below this belong to history whose original bytes are gone.
    pub historical_threshold: u64,
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel: "@RosaroterPanzerBackup".to_string(),
            endpoint: None,
            api_id: None,
            api_hash: None,
            lookback: 20,
            page_limit: 50,
            sample_cap: 200,
            historical_threshold: 13_310,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImgsyncConfig {
    pub ingest: IngestConfig,
    pub thumbnails: ThumbnailConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialImgsyncConfig {
    ingest: Option<IngestConfig>,
    thumbnails: Option<ThumbnailConfig>,
    sync: Option<SyncConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u8(var: &str, fallback: u8) -> u8 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u8>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn validate(cfg: &ImgsyncConfig) -> Result<()> {
    let invalid = |msg: &str| anyhow!(ImgsyncError::InvalidConfig(msg.to_string()));
    if !(1..=100).contains(&cfg.ingest.jpeg_quality) {
        return Err(invalid("ingest jpeg quality must be within 1..=100"));
    }
    if !(1..=100).contains(&cfg.thumbnails.jpeg_quality) {
        return Err(invalid("thumbnail jpeg quality must be within 1..=100"));
    }
    if cfg.sync.page_limit == 0 {
        return Err(invalid("sync page limit must be >= 1"));
    }
    if cfg.sync.sample_cap == 0 {
        return Err(invalid("sync sample cap must be >= 1"));
    }
    if cfg.sync.request_timeout_secs == 0 {
        return Err(invalid("sync request timeout must be >= 1 second"));
    }
    if cfg.sync.channel.trim().is_empty() {
        return Err(invalid("sync channel cannot be empty"));
    }
    Ok(())
}

fn resolve_config_path(paths: &ImgsyncPaths) -> PathBuf {
    if let Ok(custom) = env::var("IMGSYNC_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    paths.root.join(CONFIG_FILE_NAME)
}

fn merge_file_config(paths: &ImgsyncPaths, base: &mut ImgsyncConfig) -> Result<()> {
    let path = resolve_config_path(paths);
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialImgsyncConfig = toml::from_str(&raw).map_err(|err| {
        ImgsyncError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
    })?;
    if let Some(ingest) = parsed.ingest {
        base.ingest = ingest;
    }
    if let Some(thumbnails) = parsed.thumbnails {
        base.thumbnails = thumbnails;
    }
    if let Some(sync) = parsed.sync {
        base.sync = sync;
    }
    Ok(())
}

pub fn load_config(paths: &ImgsyncPaths) -> Result<ImgsyncConfig> {
    let mut cfg = ImgsyncConfig::default();
    merge_file_config(paths, &mut cfg)?;

    cfg.ingest.jpeg_quality = env_or_u8("IMGSYNC_JPEG_QUALITY", cfg.ingest.jpeg_quality);
    cfg.thumbnails.jpeg_quality =
        env_or_u8("IMGSYNC_THUMBNAIL_QUALITY", cfg.thumbnails.jpeg_quality);
    cfg.sync.channel = env_or_string("IMGSYNC_CHANNEL", &cfg.sync.channel);
    cfg.sync.endpoint = env_or_optional("IMGSYNC_CHANNEL_ENDPOINT", cfg.sync.endpoint.take());
    cfg.sync.api_id = env_or_optional("IMGSYNC_API_ID", cfg.sync.api_id.take());
    cfg.sync.api_hash = env_or_optional("IMGSYNC_API_HASH", cfg.sync.api_hash.take());
    cfg.sync.request_timeout_secs = env_or_u64(
        "IMGSYNC_REQUEST_TIMEOUT_SECS",
        cfg.sync.request_timeout_secs,
    );

    validate(&cfg)?;
    Ok(cfg)
}
