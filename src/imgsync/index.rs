use crate::error::ImgsyncError;
use crate::imgsync::paths::{ENTRY_INDEX_NAME, ImgsyncPaths, THUMBNAILS_NAME};
use crate::imgsync::util::{is_jpg_name, write_atomic};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Directory key (`"2024/07"`, relative to the archive root) to image count.
pub type DirIndex = BTreeMap<String, usize>;

#[derive(Debug, Clone, Default)]
pub struct IndexOutcome {
    pub directories: usize,
    pub images: usize,
    pub decoded: usize,
    pub dir_index_written: bool,
    pub entry_indexes_written: Vec<PathBuf>,
}

/// Compact array, one element per line, with `", "` and `": "` inside
/// objects and non-ASCII escaped. Indexes already in the archive use
/// exactly this layout, so unchanged content serializes to identical bytes.
struct EntryIndexFormatter;

impl Formatter for EntryIndexFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b",\n")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

pub fn serialize_entry_index(records: &[ImageRecord]) -> Result<Vec<u8>> {
    let mut ser = serde_json::Serializer::with_formatter(Vec::new(), EntryIndexFormatter);
    records.serialize(&mut ser)?;
    Ok(ser.into_inner())
}

pub fn serialize_dir_index(index: &DirIndex) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(index)?)
}

fn dir_key(archive_dir: &Path, dir: &Path) -> String {
    dir.strip_prefix(archive_dir)
        .unwrap_or(dir)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(raw))
}

/// Archived images grouped by their directory. Generated sheets are not
/// entries. Directories that still carry an entry index but lost all their
/// images are listed with no names so their index empties out.
pub fn scan_archive(archive_dir: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let mut by_dir: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if !archive_dir.is_dir() {
        return Ok(by_dir);
    }

    for entry in WalkDir::new(archive_dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", archive_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(parent) = entry.path().parent() else {
            continue;
        };
        let key = dir_key(archive_dir, parent);
        if name == ENTRY_INDEX_NAME {
            by_dir.entry(key).or_default();
        } else if is_jpg_name(name) && name != THUMBNAILS_NAME {
            by_dir.entry(key).or_default().push(name.to_string());
        }
    }

    for names in by_dir.values_mut() {
        names.sort();
    }
    Ok(by_dir)
}

fn dir_path(archive_dir: &Path, key: &str) -> PathBuf {
    key.split('/')
        .filter(|part| !part.is_empty())
        .fold(archive_dir.to_path_buf(), |acc, part| acc.join(part))
}

pub fn build_dir_index(by_dir: &BTreeMap<String, Vec<String>>) -> DirIndex {
    by_dir
        .iter()
        .filter(|(_, names)| !names.is_empty())
        .map(|(key, names)| (key.clone(), names.len()))
        .collect()
}

fn image_dimensions(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path).map_err(|err| {
        ImgsyncError::Decode {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
        .into()
    })
}

/// Carry forward known records, measure new names once, drop vanished ones.
/// Returns the merged list sorted by name and how many images were decoded.
pub fn merge_entries(
    dir: &Path,
    previous: Vec<ImageRecord>,
    names: &[String],
) -> Result<(Vec<ImageRecord>, usize)> {
    let mut known: HashMap<String, ImageRecord> = previous
        .into_iter()
        .map(|record| (record.name.clone(), record))
        .collect();

    let mut decoded = 0usize;
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if let Some(record) = known.remove(name) {
            out.push(record);
            continue;
        }
        let (width, height) = image_dimensions(&dir.join(name))?;
        decoded += 1;
        out.push(ImageRecord {
            name: name.clone(),
            width,
            height,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok((out, decoded))
}

pub fn load_entry_index(path: &Path) -> Result<Vec<ImageRecord>> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn update_entry_index(dir: &Path, names: &[String]) -> Result<(Option<PathBuf>, usize)> {
    let index_path = dir.join(ENTRY_INDEX_NAME);
    let old_data = read_optional(&index_path)?;
    let previous = match &old_data {
        Some(raw) => serde_json::from_slice(raw)
            .with_context(|| format!("failed to parse {}", index_path.display()))?,
        None => Vec::new(),
    };

    let (records, decoded) = merge_entries(dir, previous, names)?;
    let new_data = serialize_entry_index(&records)?;
    if old_data.as_deref() == Some(new_data.as_slice()) {
        debug!("entry index unchanged {}", index_path.display());
        return Ok((None, decoded));
    }

    write_atomic(&index_path, &new_data)?;
    info!("updated entry index {} ({} entries)", index_path.display(), records.len());
    Ok((Some(index_path), decoded))
}

pub fn update_indexes(paths: &ImgsyncPaths) -> Result<IndexOutcome> {
    let by_dir = scan_archive(&paths.archive_dir)?;
    let mut out = IndexOutcome::default();

    let dir_index = build_dir_index(&by_dir);
    out.images = dir_index.values().sum();
    let dir_index_path = paths.dir_index_file();
    let dir_index_data = serialize_dir_index(&dir_index)?;
    if read_optional(&dir_index_path)?.as_deref() != Some(dir_index_data.as_slice()) {
        write_atomic(&dir_index_path, &dir_index_data)?;
        info!("updated dir index {}", dir_index_path.display());
        out.dir_index_written = true;
    }

    for (key, names) in &by_dir {
        out.directories += 1;
        let dir = dir_path(&paths.archive_dir, key);
        let (written, decoded) = update_entry_index(&dir, names)?;
        out.decoded += decoded;
        out.entry_indexes_written.extend(written);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use tempfile::tempdir;

    fn record(name: &str, width: u32, height: u32) -> ImageRecord {
        ImageRecord {
            name: name.to_string(),
            width,
            height,
        }
    }

    fn write_jpg(path: &Path, w: u32, h: u32) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([40, 90, 160])));
        img.save_with_format(path, ImageFormat::Jpeg).expect("save jpg");
    }

    #[test]
    fn entry_index_layout_puts_one_record_per_line() {
        let data = serialize_entry_index(&[record("a.jpg", 4, 3), record("b.jpg", 1, 2)])
            .expect("serialize");
        assert_eq!(
            String::from_utf8(data).expect("utf8"),
            "[{\"name\": \"a.jpg\", \"width\": 4, \"height\": 3},\n{\"name\": \"b.jpg\", \"width\": 1, \"height\": 2}]"
        );
    }

    #[test]
    fn entry_index_escapes_non_ascii() {
        let data = serialize_entry_index(&[record("caf\u{e9}.jpg", 1, 1)]).expect("serialize");
        assert_eq!(
            String::from_utf8(data).expect("utf8"),
            "[{\"name\": \"caf\\u00e9.jpg\", \"width\": 1, \"height\": 1}]"
        );
        assert_eq!(serialize_entry_index(&[]).expect("empty"), b"[]");
    }

    #[test]
    fn dir_index_is_two_space_pretty_json() {
        let mut index = DirIndex::new();
        index.insert("2024/07".to_string(), 3);
        index.insert("2023/12".to_string(), 1);
        let data = serialize_dir_index(&index).expect("serialize");
        assert_eq!(
            String::from_utf8(data).expect("utf8"),
            "{\n  \"2023/12\": 1,\n  \"2024/07\": 3\n}"
        );
    }

    #[test]
    fn known_records_are_kept_without_decoding() {
        let tmp = tempdir().expect("tempdir");
        write_jpg(&tmp.path().join("b.jpg"), 5, 7);
        // a.jpg is not on disk; its recorded size must be trusted.
        let previous = vec![record("gone.jpg", 9, 9), record("a.jpg", 100, 50)];
        let names = vec!["b.jpg".to_string(), "a.jpg".to_string()];

        let (records, decoded) = merge_entries(tmp.path(), previous, &names).expect("merge");
        assert_eq!(decoded, 1);
        assert_eq!(records, vec![record("a.jpg", 100, 50), record("b.jpg", 5, 7)]);
    }

    #[test]
    fn scan_skips_sheets_and_non_jpg_files() {
        let tmp = tempdir().expect("tempdir");
        let archive = tmp.path().join("archive");
        write_jpg(&archive.join("2024/07/2024-07-20_a.jpg"), 2, 2);
        write_jpg(&archive.join("2024/07/thumbnails.jpg"), 2, 2);
        fs::write(archive.join("2024/07/notes.txt"), b"x").expect("write");
        write_jpg(&archive.join("2023/01/2023-01-05_z.jpg"), 2, 2);

        let by_dir = scan_archive(&archive).expect("scan");
        assert_eq!(by_dir.len(), 2);
        assert_eq!(by_dir["2024/07"], vec!["2024-07-20_a.jpg".to_string()]);
        assert_eq!(by_dir["2023/01"], vec!["2023-01-05_z.jpg".to_string()]);
    }

    #[test]
    fn second_update_writes_nothing() {
        let tmp = tempdir().expect("tempdir");
        let paths = ImgsyncPaths::under(tmp.path());
        write_jpg(&paths.archive_dir.join("2024/07/2024-07-20_b.jpg"), 3, 2);
        write_jpg(&paths.archive_dir.join("2024/07/2024-07-19_a.jpg"), 2, 3);

        let first = update_indexes(&paths).expect("first");
        assert!(first.dir_index_written);
        assert_eq!(first.entry_indexes_written.len(), 1);
        assert_eq!(first.decoded, 2);

        let index_path = paths.archive_dir.join("2024/07").join(ENTRY_INDEX_NAME);
        let before = fs::read(&index_path).expect("read");

        let second = update_indexes(&paths).expect("second");
        assert!(!second.dir_index_written);
        assert!(second.entry_indexes_written.is_empty());
        assert_eq!(second.decoded, 0);
        assert_eq!(fs::read(&index_path).expect("read"), before);

        let records = load_entry_index(&index_path).expect("load");
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["2024-07-19_a.jpg", "2024-07-20_b.jpg"]);
    }

    #[test]
    fn removed_images_leave_the_indexes() {
        let tmp = tempdir().expect("tempdir");
        let paths = ImgsyncPaths::under(tmp.path());
        let doomed = paths.archive_dir.join("2024/06/2024-06-01_x.jpg");
        write_jpg(&doomed, 2, 2);
        write_jpg(&paths.archive_dir.join("2024/07/2024-07-01_y.jpg"), 2, 2);
        update_indexes(&paths).expect("first");

        fs::remove_file(&doomed).expect("remove");
        let out = update_indexes(&paths).expect("second");
        assert!(out.dir_index_written);

        let dir_index: DirIndex =
            serde_json::from_slice(&fs::read(paths.dir_index_file()).expect("read"))
                .expect("parse");
        assert_eq!(dir_index.get("2024/06"), None);
        assert_eq!(dir_index.get("2024/07"), Some(&1));
        let emptied =
            load_entry_index(&paths.archive_dir.join("2024/06").join(ENTRY_INDEX_NAME))
                .expect("load");
        assert!(emptied.is_empty());
    }
}
