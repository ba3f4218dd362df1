//! Perceptual fingerprint used as a near-duplicate key.
//!
//! The image is shrunk to a 4x4 grid, each sample is snapped to a coarse
//! per-channel bucket, the samples are quantized to an adaptive 8-entry
//! palette, and each cell's palette index is compared against the mean
//! index. The shifted deviations are read as the 16 digits of a base-8
//! number and rendered as 12 hex characters. Resolution changes and
//! recompression of the same picture land on the same digest; unrelated
//! pictures may collide, which callers must tolerate.

use crate::error::ImgsyncError;
use anyhow::{Context, Result};
use image::imageops::FilterType;
use std::fs;
use std::path::Path;

const GRID: u32 = 4;
const SAMPLES: usize = (GRID * GRID) as usize;
const PALETTE_SIZE: usize = 8;
/// Samples are snapped to the middle of buckets this wide per channel
/// before quantizing, so recompression noise cannot reshuffle the palette.
const CHANNEL_BUCKET: u8 = 16;

type Rgb = [u8; 3];

/// `origin` names the source of `bytes` in decode errors.
pub fn digest_bytes(bytes: &[u8], origin: &Path) -> Result<String> {
    let img = image::load_from_memory(bytes).map_err(|err| ImgsyncError::Decode {
        path: origin.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(digest_image(&img))
}

pub fn digest_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    digest_bytes(&bytes, path)
}

pub fn digest_image(img: &image::DynamicImage) -> String {
    let small = img
        .resize_exact(GRID, GRID, FilterType::Lanczos3)
        .to_rgb8();
    let samples: Vec<Rgb> = small.pixels().map(|p| coarsen(p.0)).collect();
    let indices = quantize(&samples, PALETTE_SIZE);

    let mut grid = [0u8; SAMPLES];
    grid.copy_from_slice(&indices[..SAMPLES]);
    digest_from_indices(&grid)
}

fn coarsen(c: Rgb) -> Rgb {
    c.map(|v| v / CHANNEL_BUCKET * CHANNEL_BUCKET + CHANNEL_BUCKET / 2)
}

fn digest_from_indices(indices: &[u8; SAMPLES]) -> String {
    let mean = indices.iter().map(|&i| f64::from(i)).sum::<f64>() / SAMPLES as f64;
    // `as` truncates toward zero.
    let deviations: Vec<i64> = indices
        .iter()
        .map(|&i| (f64::from(i) - mean) as i64)
        .collect();
    let offset = deviations.iter().copied().min().unwrap_or(0).abs();

    let value = deviations
        .iter()
        .fold(0u64, |acc, dev| acc * 8 + (dev + offset) as u64);
    format!("{value:012x}")
}

fn luminance(c: &Rgb) -> u32 {
    299 * u32::from(c[0]) + 587 * u32::from(c[1]) + 114 * u32::from(c[2])
}

fn channel_range(colors: &[Rgb], channel: usize) -> u8 {
    let min = colors.iter().map(|c| c[channel]).min().unwrap_or(0);
    let max = colors.iter().map(|c| c[channel]).max().unwrap_or(0);
    max - min
}

fn widest_channel(colors: &[Rgb]) -> (usize, u8) {
    (0..3)
        .map(|ch| (ch, channel_range(colors, ch)))
        .max_by_key(|&(ch, range)| (range, std::cmp::Reverse(ch)))
        .unwrap_or((0, 0))
}

fn average(colors: &[Rgb]) -> Rgb {
    let n = colors.len().max(1) as u32;
    let mut sum = [0u32; 3];
    for c in colors {
        for ch in 0..3 {
            sum[ch] += u32::from(c[ch]);
        }
    }
    sum.map(|s| ((s + n / 2) / n) as u8)
}

/// Median-cut palette over `pixels`, ordered dark to light so that the
/// index of a cell carries meaning on its own. Returns one palette index
/// per pixel.
fn quantize(pixels: &[Rgb], max_colors: usize) -> Vec<u8> {
    let mut distinct: Vec<Rgb> = pixels.to_vec();
    distinct.sort_unstable();
    distinct.dedup();

    let mut palette = if distinct.len() <= max_colors {
        distinct
    } else {
        median_cut(pixels, max_colors)
    };
    palette.sort_by_key(|c| (luminance(c), *c));

    pixels
        .iter()
        .map(|px| nearest(&palette, px))
        .collect()
}

fn median_cut(pixels: &[Rgb], max_colors: usize) -> Vec<Rgb> {
    let mut boxes: Vec<Vec<Rgb>> = vec![pixels.to_vec()];
    while boxes.len() < max_colors {
        let Some((pos, channel)) = boxes
            .iter()
            .enumerate()
            .map(|(pos, colors)| (pos, widest_channel(colors)))
            .filter(|(_, (_, range))| *range > 0)
            .max_by_key(|(pos, (_, range))| (*range, std::cmp::Reverse(*pos)))
            .map(|(pos, (channel, _))| (pos, channel))
        else {
            break;
        };

        let mut colors = boxes.swap_remove(pos);
        colors.sort_by_key(|c| (c[channel], *c));
        let split = split_point(&colors, channel);
        let upper = colors.split_off(split);
        boxes.push(colors);
        boxes.push(upper);
    }
    boxes.iter().map(|colors| average(colors)).collect()
}

/// First position at or after the median where the channel value changes,
/// falling back to the last change before it. Both halves stay non-empty.
fn split_point(sorted: &[Rgb], channel: usize) -> usize {
    let mid = sorted.len() / 2;
    let changes_at = |i: usize| sorted[i][channel] != sorted[i - 1][channel];
    (mid.max(1)..sorted.len())
        .find(|&i| changes_at(i))
        .or_else(|| (1..mid).rev().find(|&i| changes_at(i)))
        .unwrap_or(mid.max(1))
}

fn nearest(palette: &[Rgb], px: &Rgb) -> u8 {
    let dist = |c: &Rgb| -> i32 {
        (0..3)
            .map(|ch| {
                let d = i32::from(c[ch]) - i32::from(px[ch]);
                d * d
            })
            .sum()
    };
    palette
        .iter()
        .enumerate()
        .min_by_key(|&(i, c)| (dist(c), i))
        .map(|(i, _)| i as u8)
        .unwrap_or(0)
}
