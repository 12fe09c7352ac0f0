//! Integration tests for reconciling the index with the managed folder.
//!
//! These tests verify:
//! - Pruning removes exactly the records whose files are gone
//! - Discovery tags new files with their folder names
//! - Exact copies dropped into the folder are soft-deleted, including copies
//!   of images that were normalized when added
//! - A fingerprint rebuild keeps one image of a near-duplicate pair

use assert_fs::prelude::*;
use assert_fs::TempDir;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
use imshelf::config::LibraryConfig;
use imshelf::{AddRequest, Library};
use predicates::prelude::*;
use std::collections::BTreeSet;
use std::io::Cursor;
use std::path::Path;

fn open_library(dir: &TempDir) -> Library {
    let config = LibraryConfig::for_folder(dir.child("library").path())
        .index_path(dir.child("index.db").path())
        .trash_dir(dir.child("trash").path())
        .threshold(5);
    Library::open_creating(config).unwrap()
}

fn pixels(seed: u32) -> RgbImage {
    ImageBuffer::from_fn(64, 64, |x, y| {
        if x == 0 || y == 0 || x == 63 || y == 63 {
            return Rgb([125, 125, 125]);
        }
        let block = (x / 8) * 8 + y / 8;
        let noise = block.wrapping_add(seed.wrapping_mul(97)).wrapping_mul(2_654_435_761) >> 16;
        let v = if noise & 1 == 1 { 190 } else { 60 };
        Rgb([v, v, v])
    })
}

fn encode(image: RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn png(seed: u32) -> Vec<u8> {
    encode(pixels(seed))
}

fn png_nudged(seed: u32) -> Vec<u8> {
    let mut image = pixels(seed);
    let Rgb([v, _, _]) = *image.get_pixel(20, 20);
    let nudged = if v > 128 { v - 4 } else { v + 4 };
    image.put_pixel(20, 20, Rgb([nudged, nudged, nudged]));
    encode(image)
}

/// Random blocks on a wide white border that normalization trims away
fn bordered_png(seed: u32) -> Vec<u8> {
    encode(ImageBuffer::from_fn(200, 200, |x, y| {
        if !(30..170).contains(&x) || !(30..170).contains(&y) {
            return Rgb([255, 255, 255]);
        }
        let block = ((x - 30) / 14) * 10 + (y - 30) / 14;
        let noise = block.wrapping_add(seed.wrapping_mul(97)).wrapping_mul(2_654_435_761) >> 16;
        let v = if noise & 1 == 1 { 110 } else { 20 };
        Rgb([v, v, v])
    }))
}

fn paths(library: &Library) -> Vec<String> {
    library
        .index()
        .all()
        .unwrap()
        .into_iter()
        .map(|i| i.path)
        .collect()
}

#[test]
fn prune_removes_only_the_deleted_file() {
    let dir = TempDir::new().unwrap();
    let library = open_library(&dir);
    for (name, seed) in [("keep.png", 1), ("gone.png", 2), ("also-keep.png", 3)] {
        dir.child("library").child(name).write_binary(&png(seed)).unwrap();
    }
    library.refresh(true).unwrap();
    assert_eq!(library.index().count().unwrap(), 3);

    std::fs::remove_file(dir.child("library/gone.png").path()).unwrap();
    let report = library.refresh(true).unwrap();

    assert_eq!(report.pruned, 1);
    assert_eq!(paths(&library), vec!["also-keep.png", "keep.png"]);
}

#[test]
fn discovered_file_is_tagged_with_its_folders() {
    let dir = TempDir::new().unwrap();
    let library = open_library(&dir);
    dir.child("library/a/b/new.png").write_binary(&png(4)).unwrap();

    let report = library.refresh(true).unwrap();

    assert_eq!(report.discovered, 1);
    let image = library.get(Path::new("a/b/new.png")).unwrap().unwrap();
    let expected: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
    assert_eq!(image.tags, expected);
    dir.child("library/a/b/new.png")
        .assert(predicate::path::exists());
}

#[test]
fn exact_copy_dropped_into_folder_is_trashed() {
    let dir = TempDir::new().unwrap();
    let library = open_library(&dir);
    dir.child("library/cat.png").write_binary(&png(5)).unwrap();
    library.refresh(true).unwrap();

    dir.child("library/cat_copy.png").write_binary(&png(5)).unwrap();
    let report = library.refresh(true).unwrap();

    assert_eq!(report.conflicts, 1);
    assert_eq!(paths(&library), vec!["cat.png"]);
    dir.child("library/cat_copy.png")
        .assert(predicate::path::missing());
    dir.child("trash/cat_copy.png")
        .assert(predicate::path::exists());
}

#[test]
fn copy_of_normalized_upload_dropped_into_folder_is_trashed() {
    let dir = TempDir::new().unwrap();
    let library = open_library(&dir);
    library
        .add(AddRequest::from_bytes(bordered_png(1)).filename("photo.png"))
        .unwrap();

    dir.child("library/inbox/photo.png")
        .write_binary(&bordered_png(1))
        .unwrap();
    let report = library.refresh(true).unwrap();

    assert_eq!(report.discovered, 0);
    assert_eq!(report.conflicts, 1);
    assert_eq!(paths(&library), vec!["photo.png"]);
    dir.child("library/inbox/photo.png")
        .assert(predicate::path::missing());
    dir.child("trash/inbox/photo.png")
        .assert(predicate::path::exists());
}

#[test]
fn non_images_are_swept_unless_kept() {
    let dir = TempDir::new().unwrap();
    let library = open_library(&dir);
    dir.child("library/readme.txt").write_str("hello").unwrap();

    let kept = library.refresh(false).unwrap();
    assert_eq!(kept.swept, 0);
    dir.child("library/readme.txt").assert(predicate::path::exists());

    let swept = library.refresh(true).unwrap();
    assert_eq!(swept.swept, 1);
    dir.child("library/readme.txt").assert(predicate::path::missing());
    dir.child("trash/readme.txt").assert("hello");
}

#[test]
fn rehash_keeps_one_of_a_near_duplicate_pair() {
    let dir = TempDir::new().unwrap();
    let library = open_library(&dir);
    for (name, bytes) in [
        ("scan.png", png(6)),
        ("scan-again.png", png_nudged(6)),
        ("other.png", png(7)),
    ] {
        library
            .add(
                AddRequest::from_bytes(bytes)
                    .filename(name)
                    .skip_hash(true),
            )
            .unwrap();
    }
    assert_eq!(library.index().count().unwrap(), 3);

    let report = library.calculate_hash(true).unwrap();

    assert_eq!(report.duplicates, 1);
    assert_eq!(paths(&library), vec!["scan.png", "other.png"]);
    dir.child("library/scan-again.png")
        .assert(predicate::path::missing());
    assert!(library.index().missing_perceptual_hash().unwrap().is_empty());
}

#[test]
fn changed_file_is_refingerprinted() {
    let dir = TempDir::new().unwrap();
    let library = open_library(&dir);
    dir.child("library/photo.png").write_binary(&png(8)).unwrap();
    library.refresh(true).unwrap();
    let before = library.get(Path::new("photo.png")).unwrap().unwrap();

    dir.child("library/photo.png").write_binary(&png(9)).unwrap();
    let report = library.refresh(true).unwrap();

    let after = library.get(Path::new("photo.png")).unwrap().unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(after.id, before.id);
    assert_ne!(after.checksum, before.checksum);
    assert!(after.modified >= before.modified);
}
