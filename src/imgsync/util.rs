use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, RgbImage};
use jpeg_encoder::{ColorType, Encoder};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `bytes` to `path` through a sibling temp file and an atomic rename,
/// so readers only ever see the previous or the new contents.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync temp file for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to move temp file over {}", path.display()))?;
    Ok(())
}

/// Baseline JPEG of `img` flattened to RGB, with Huffman tables optimized
/// for the image.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    encode_rgb(&img.to_rgb8(), quality, true)
}

pub(crate) fn encode_rgb(rgb: &RgbImage, quality: u8, optimize: bool) -> Result<Vec<u8>> {
    let width = u16::try_from(rgb.width()).context("image too wide for jpeg")?;
    let height = u16::try_from(rgb.height()).context("image too tall for jpeg")?;

    let mut out = Vec::new();
    let mut encoder = Encoder::new(&mut out, quality);
    encoder.set_optimized_huffman_tables(optimize);
    encoder
        .encode(rgb.as_raw(), width, height, ColorType::Rgb)
        .map_err(|err| anyhow!("failed to encode jpeg: {err}"))?;
    Ok(out)
}

pub fn is_jpg_name(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| ext == "jpg")
}
