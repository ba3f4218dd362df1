use crate::error::ImgsyncError;
use crate::imgsync::index::{ImageRecord, load_entry_index};
use crate::imgsync::paths::{ENTRY_INDEX_NAME, THUMBNAILS_NAME};
use crate::imgsync::util::{encode_jpeg, write_atomic};
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const CELL_SIZE: u32 = 150;
pub const COLUMNS: u32 = 10;
/// Gap added per column index and per row index, so gaps grow across the sheet.
const GAP_STEP: u32 = 2;

#[derive(Debug, Clone, Default)]
pub struct ThumbnailOutcome {
    pub checked: usize,
    pub rebuilt: Vec<PathBuf>,
}

/// Canvas size for `count` entries. The row count is `count / 10` and one
/// extra row of cells is added on top of it; a cell that still falls
/// outside is clipped.
pub fn sheet_size(count: usize) -> (u32, u32) {
    let rows = count as u32 / COLUMNS;
    let width = CELL_SIZE * COLUMNS + COLUMNS * GAP_STEP;
    let height = CELL_SIZE * (rows + 1) + rows * GAP_STEP;
    (width, height)
}

pub fn cell_origin(position: usize) -> (u32, u32) {
    let column = position as u32 % COLUMNS;
    let row = position as u32 / COLUMNS;
    (
        column * GAP_STEP + column * CELL_SIZE,
        row * GAP_STEP + row * CELL_SIZE,
    )
}

/// Shrink to fit the cell keeping the aspect ratio; small images stay as they are.
fn fit_to_cell(img: DynamicImage) -> DynamicImage {
    if img.width() <= CELL_SIZE && img.height() <= CELL_SIZE {
        return img;
    }
    img.resize(CELL_SIZE, CELL_SIZE, FilterType::CatmullRom)
}

fn centered_origin(position: usize, width: u32, height: u32) -> (u32, u32) {
    let (mut x, mut y) = cell_origin(position);
    // Squares take the horizontal branch, matching sheets already in the archive.
    if width > height {
        y += (CELL_SIZE - height) / 2;
    } else {
        x += (CELL_SIZE - width) / 2;
    }
    (x, y)
}

pub fn render_sheet(dir: &Path, entries: &[ImageRecord]) -> Result<RgbImage> {
    let (width, height) = sheet_size(entries.len());
    let mut canvas = RgbImage::new(width, height);

    for (position, entry) in entries.iter().enumerate() {
        let path = dir.join(&entry.name);
        let img = image::open(&path).map_err(|err| ImgsyncError::Decode {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        let thumb = fit_to_cell(img).to_rgb8();
        let (x, y) = centered_origin(position, thumb.width(), thumb.height());
        imageops::overlay(&mut canvas, &thumb, i64::from(x), i64::from(y));
    }
    Ok(canvas)
}

fn modified(path: &Path) -> Result<std::time::SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("failed to stat {}", path.display()))
}

/// A sheet is fresh when it exists and is at least as new as its entry index.
pub fn is_fresh(sheet: &Path, entry_index: &Path) -> Result<bool> {
    if !sheet.exists() {
        return Ok(false);
    }
    Ok(modified(sheet)? >= modified(entry_index)?)
}

fn entry_index_files(archive_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !archive_dir.is_dir() {
        return Ok(out);
    }
    for entry in WalkDir::new(archive_dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", archive_dir.display()))?;
        if entry.file_type().is_file() && entry.file_name() == ENTRY_INDEX_NAME {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

pub fn update_thumbnails(archive_dir: &Path, quality: u8) -> Result<ThumbnailOutcome> {
    let mut out = ThumbnailOutcome::default();
    for index_path in entry_index_files(archive_dir)? {
        out.checked += 1;
        let Some(dir) = index_path.parent() else {
            continue;
        };
        let sheet_path = dir.join(THUMBNAILS_NAME);
        if is_fresh(&sheet_path, &index_path)? {
            debug!("thumbnails fresh {}", sheet_path.display());
            continue;
        }

        info!("updating thumbnails {}", sheet_path.display());
        let entries = load_entry_index(&index_path)?;
        let sheet = render_sheet(dir, &entries)?;
        write_atomic(&sheet_path, &encode_jpeg(&DynamicImage::ImageRgb8(sheet), quality)?)?;
        out.rebuilt.push(sheet_path);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imgsync::index::serialize_entry_index;
    use crate::imgsync::util::encode_rgb;
    use image::{ImageFormat, Rgb};
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn write_jpg(path: &Path, w: u32, h: u32) {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([250, 250, 250])));
        img.save_with_format(path, ImageFormat::Jpeg).expect("save jpg");
    }

    fn set_mtime(path: &Path, at: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .expect("open")
            .set_modified(at)
            .expect("set mtime");
    }

    fn seed_dir(dir: &Path) -> PathBuf {
        fs::create_dir_all(dir).expect("mkdir");
        write_jpg(&dir.join("a.jpg"), 300, 150);
        write_jpg(&dir.join("b.jpg"), 60, 120);
        let records = vec![
            ImageRecord {
                name: "a.jpg".to_string(),
                width: 300,
                height: 150,
            },
            ImageRecord {
                name: "b.jpg".to_string(),
                width: 60,
                height: 120,
            },
        ];
        let index = dir.join(ENTRY_INDEX_NAME);
        fs::write(&index, serialize_entry_index(&records).expect("serialize")).expect("write");
        index
    }

    #[test]
    fn layout_grows_gaps_with_position() {
        assert_eq!(cell_origin(0), (0, 0));
        assert_eq!(cell_origin(1), (152, 0));
        assert_eq!(cell_origin(12), (304, 152));
        assert_eq!(cell_origin(23), (456, 304));
    }

    #[test]
    fn row_count_uses_integer_division() {
        assert_eq!(sheet_size(5), (1520, 150));
        assert_eq!(sheet_size(20), (1520, 454));
        assert_eq!(sheet_size(23), (1520, 454));
    }

    #[test]
    fn wide_images_center_vertically_and_tall_ones_horizontally() {
        assert_eq!(centered_origin(0, 150, 75), (0, 37));
        assert_eq!(centered_origin(1, 60, 120), (152 + 45, 0));
        assert_eq!(centered_origin(0, 100, 100), (25, 0));
    }

    #[test]
    fn sheet_is_built_once_and_rebuilt_when_stale() {
        let tmp = tempdir().expect("tempdir");
        let dir = tmp.path().join("2024/07");
        let index = seed_dir(&dir);
        let sheet = dir.join(THUMBNAILS_NAME);

        let first = update_thumbnails(tmp.path(), 70).expect("first");
        assert_eq!(first.rebuilt, vec![sheet.clone()]);
        assert_eq!(image::image_dimensions(&sheet).expect("dims"), (1520, 150));

        let second = update_thumbnails(tmp.path(), 70).expect("second");
        assert_eq!(second.checked, 1);
        assert!(second.rebuilt.is_empty());

        let now = SystemTime::now();
        set_mtime(&sheet, now - Duration::from_secs(3600));
        set_mtime(&index, now);
        let third = update_thumbnails(tmp.path(), 70).expect("third");
        assert_eq!(third.rebuilt, vec![sheet]);
    }

    #[test]
    fn sheet_jpeg_is_smaller_with_optimized_tables() {
        let tmp = tempdir().expect("tempdir");
        seed_dir(tmp.path());
        let entries = load_entry_index(&tmp.path().join(ENTRY_INDEX_NAME)).expect("entries");
        let sheet = render_sheet(tmp.path(), &entries).expect("render");

        let optimized = encode_jpeg(&DynamicImage::ImageRgb8(sheet.clone()), 70).expect("encode");
        let plain = encode_rgb(&sheet, 70, false).expect("encode plain");
        assert!(optimized.len() < plain.len(), "{} >= {}", optimized.len(), plain.len());

        let decoded = image::load_from_memory(&optimized).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), sheet_size(entries.len()));
    }

    #[test]
    fn sheet_as_new_as_index_is_fresh() {
        let tmp = tempdir().expect("tempdir");
        let index = seed_dir(tmp.path());
        let sheet = tmp.path().join(THUMBNAILS_NAME);
        fs::write(&sheet, b"placeholder").expect("write");
        let at = SystemTime::now() - Duration::from_secs(60);
        set_mtime(&sheet, at);
        set_mtime(&index, at);

        assert!(is_fresh(&sheet, &index).expect("fresh"));
        let out = update_thumbnails(tmp.path(), 70).expect("update");
        assert!(out.rebuilt.is_empty());
        assert_eq!(fs::read(&sheet).expect("read"), b"placeholder");
    }
}
