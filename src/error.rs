use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions that abort a run. None of them are retried; the operator
/// fixes the cause and re-runs, which is safe because every stage is idempotent.
#[derive(Debug, Error)]
pub enum ImgsyncError {
    #[error("unsupported source format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("fingerprint {digest} collides within recent archive sample: {first} and {second}")]
    FingerprintCollision {
        digest: String,
        first: String,
        second: String,
    },
    #[error("failed to decode image {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
}
