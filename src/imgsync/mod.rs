pub mod config;
pub mod dedup_cache;
pub mod fingerprint;
pub mod index;
pub mod normalize;
pub mod paths;
pub mod sync;
pub mod thumbnails;
pub mod util;
