use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tempfile::tempdir;

fn write_image(path: &Path, color: [u8; 3], format: ImageFormat) {
    let img = RgbImage::from_fn(40, 30, |x, y| {
        if (x / 10 + y / 10) % 2 == 0 {
            Rgb(color)
        } else {
            Rgb([0, 0, 0])
        }
    });
    DynamicImage::ImageRgb8(img)
        .save_with_format(path, format)
        .expect("write fixture");
}

fn imgsync(root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("imgsync");
    cmd.current_dir(root)
        .env("IMGSYNC_HOME", root)
        .env_remove("IMGSYNC_ARCHIVE_DIR")
        .env_remove("IMGSYNC_UPLOAD_DIR")
        .env_remove("IMGSYNC_CACHE_FILE")
        .env_remove("IMGSYNC_CONFIG_PATH");
    cmd
}

fn archive_jpgs(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read archive dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".jpg") && n != "thumbnails.jpg")
        .collect();
    names.sort();
    names
}

fn snapshot(path: &Path) -> (Vec<u8>, SystemTime) {
    let bytes = fs::read(path).expect("read");
    let mtime = fs::metadata(path).expect("stat").modified().expect("mtime");
    (bytes, mtime)
}

#[test]
fn ingest_builds_dated_archive_and_indexes() {
    let tmp = tempdir().expect("tempdir");
    let upload = tmp.path().join("upload");
    fs::create_dir_all(&upload).expect("mkdir upload");
    write_image(&upload.join("2024-07-20_a.png"), [250, 0, 0], ImageFormat::Png);
    write_image(&upload.join("2024-07-20_b.png"), [0, 0, 250], ImageFormat::Png);
    write_image(&upload.join("2024-07-19_c.jpg"), [0, 250, 0], ImageFormat::Jpeg);

    imgsync(tmp.path()).assert().success();

    let month = tmp.path().join("archive/2024/07");
    let want = vec![
        "2024-07-19_c.jpg".to_string(),
        "2024-07-20_a.jpg".to_string(),
        "2024-07-20_b.jpg".to_string(),
    ];
    assert_eq!(archive_jpgs(&month), want);
    assert_eq!(fs::read_dir(&upload).expect("read upload").count(), 0);

    let entries: Vec<serde_json::Value> =
        serde_json::from_slice(&fs::read(month.join("entry_index.json")).expect("read"))
            .expect("parse entry index");
    let names: Vec<&str> = entries
        .iter()
        .map(|e| e["name"].as_str().expect("name"))
        .collect();
    assert_eq!(names, want);
    assert!(entries.iter().all(|e| e["width"] == 40 && e["height"] == 30));

    let dir_index: serde_json::Value =
        serde_json::from_slice(&fs::read(tmp.path().join("archive/dir_index.json")).expect("read"))
            .expect("parse dir index");
    assert_eq!(dir_index["2024/07"], 3);
    assert!(month.join("thumbnails.jpg").exists());
}

#[test]
fn second_run_rewrites_nothing() {
    let tmp = tempdir().expect("tempdir");
    let upload = tmp.path().join("upload");
    fs::create_dir_all(&upload).expect("mkdir upload");
    write_image(&upload.join("2024-07-20_a.png"), [250, 0, 0], ImageFormat::Png);

    imgsync(tmp.path()).arg("ingest").assert().success();

    let month = tmp.path().join("archive/2024/07");
    let tracked = [
        tmp.path().join("archive/dir_index.json"),
        month.join("entry_index.json"),
        month.join("thumbnails.jpg"),
    ];
    let before: Vec<_> = tracked.iter().map(|p| snapshot(p)).collect();

    imgsync(tmp.path()).arg("index").assert().success();
    imgsync(tmp.path()).assert().success();

    let after: Vec<_> = tracked.iter().map(|p| snapshot(p)).collect();
    assert_eq!(before, after);
}

#[test]
fn unsupported_upload_aborts_the_batch() {
    let tmp = tempdir().expect("tempdir");
    let upload = tmp.path().join("upload");
    fs::create_dir_all(&upload).expect("mkdir upload");
    write_image(&upload.join("2024-07-20_a.png"), [250, 0, 0], ImageFormat::Png);
    fs::write(upload.join("clip.gif"), b"GIF89a").expect("write gif");

    imgsync(tmp.path())
        .assert()
        .failure()
        .stderr(predicates::str::contains("unsupported source format"));

    assert!(upload.join("2024-07-20_a.png").exists());
    assert!(!tmp.path().join("archive").exists());
}
