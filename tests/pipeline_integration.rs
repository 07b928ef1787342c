//! End-to-end pipeline tests with a stand-in segmentation backend
//!
//! Exercise load, remove and save through the public API and check the
//! properties the logo workflow relies on: same size, real alpha, no partial
//! output on failure.

mod common;

use common::{disc_processor, logo_image, write_png};
use image::GenericImageView;
use logo_bgremove::{BgRemovalError, ImageIOService, ProcessingStage, RemovalResult};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

async fn run(input: &Path, output: &Path) -> logo_bgremove::Result<RemovalResult> {
    disc_processor().process_file_to_png(input, output).await
}

#[tokio::test]
async fn test_output_keeps_dimensions_and_has_alpha() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("logo.png");
    let output = temp_dir.path().join("logo-transparent.png");
    write_png(&logo_image(120, 80), &input);

    let result = run(&input, &output).await.unwrap();
    assert_eq!(result.dimensions(), (120, 80));

    let saved = ImageIOService::load_image(&output).unwrap();
    assert_eq!(saved.dimensions(), (120, 80));
    assert!(saved.color().has_alpha());

    let rgba = saved.to_rgba8();
    // Corners lie outside the disc, the centre inside
    assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 0, 0]);
    assert_eq!(rgba.get_pixel(119, 79).0, [0, 0, 0, 0]);
    assert_eq!(rgba.get_pixel(60, 40).0[3], 255);
    assert_eq!(rgba.get_pixel(60, 40).0, [20, 60, 160, 255]);
}

#[tokio::test]
async fn test_non_square_inputs_round_trip_size() {
    let temp_dir = TempDir::new().unwrap();
    for (width, height) in [(1, 1), (17, 301), (640, 33)] {
        let input = temp_dir.path().join(format!("in-{}x{}.png", width, height));
        let output = temp_dir.path().join(format!("out-{}x{}.png", width, height));
        write_png(&logo_image(width, height), &input);

        let result = run(&input, &output).await.unwrap();
        assert_eq!(result.dimensions(), (width, height));
        assert_eq!(result.mask.dimensions, (width, height));
        assert_eq!(image::open(&output).unwrap().dimensions(), (width, height));
    }
}

#[tokio::test]
async fn test_jpeg_input_produces_png_output() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("logo.jpg");
    let output = temp_dir.path().join("logo.png");
    logo_image(48, 48)
        .to_rgb8()
        .save_with_format(&input, image::ImageFormat::Jpeg)
        .unwrap();

    run(&input, &output).await.unwrap();
    let bytes = fs::read(&output).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn test_missing_input_leaves_existing_output_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("peterson-pro-services-logo.png");
    let output = temp_dir.path().join("peterson-pro-services-logo-transparent.png");
    fs::write(&output, b"previous transparent logo").unwrap();

    let err = run(&input, &output).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("peterson-pro-services-logo.png"));
    assert_eq!(fs::read(&output).unwrap(), b"previous transparent logo");
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_corrupt_input_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("logo.png");
    let output = temp_dir.path().join("out.png");
    fs::write(&input, b"\x89PNG\r\n\x1a\ntruncated").unwrap();

    let err = run(&input, &output).await.unwrap_err();
    assert!(matches!(err, BgRemovalError::Image(_)));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_unwritable_destination_leaves_no_stray_file() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("logo.png");
    write_png(&logo_image(32, 32), &input);
    let output = temp_dir.path().join("no-such-dir").join("out.png");

    assert!(run(&input, &output).await.is_err());
    assert!(!output.exists());

    let entries: Vec<_> = fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("logo.png")]);
}

#[tokio::test]
async fn test_processor_is_reused_across_images() {
    let temp_dir = TempDir::new().unwrap();
    let mut processor = disc_processor();

    for size in [24, 48] {
        let input = temp_dir.path().join(format!("{}.png", size));
        let output = temp_dir.path().join(format!("{}-t.png", size));
        write_png(&logo_image(size, size), &input);
        let result = processor.process_file_to_png(&input, &output).await.unwrap();
        assert_eq!(result.dimensions(), (size, size));
        assert_eq!(result.metadata.model_name, "disc");
    }
    assert!(processor.is_initialized());
}

#[test]
fn test_stage_descriptions_are_user_facing() {
    assert_eq!(ProcessingStage::Inference.description(), "Running AI inference");
    assert_eq!(ProcessingStage::FileSaving.progress_percentage(), 99);
}
