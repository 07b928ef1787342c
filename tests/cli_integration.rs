//! Command-line behaviour: status lines and exit codes

#![cfg(feature = "cli")]

mod common;

use common::{disc_processor, logo_image, write_png};
use logo_bgremove::cli::{remove_logo_background, SharedOutput, EXIT_FAILURE, EXIT_SUCCESS};
use logo_bgremove::LogoJob;
use std::fs;
use std::process::Command;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn capture() -> (Arc<Mutex<Vec<u8>>>, SharedOutput) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let out: SharedOutput = buffer.clone();
    (buffer, out)
}

fn captured_text(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
}

#[tokio::test]
async fn test_successful_run_exits_zero() {
    let temp_dir = TempDir::new().unwrap();
    let job = LogoJob::new(
        temp_dir.path().join("peterson-pro-services-logo.png"),
        temp_dir.path().join("peterson-pro-services-logo-transparent.png"),
    );
    write_png(&logo_image(90, 45), &job.input);

    let (buffer, out) = capture();
    let status = remove_logo_background(&job, disc_processor(), out).await;

    assert_eq!(status, EXIT_SUCCESS);
    assert!(job.output.exists());

    let text = captured_text(&buffer);
    assert!(text.starts_with("🎨 Processing logo with elite-tier background removal...\n"));
    assert!(text.contains("✓ Loaded image: 90x45 pixels\n"));
    assert!(text.contains("📊 Output size: 90x45 pixels\n"));
    assert!(text.ends_with(
        "\n🎉 Background removal complete!\n📝 Next step: Replace the original logo with the transparent version\n"
    ));
}

#[tokio::test]
async fn test_failed_run_exits_one() {
    let temp_dir = TempDir::new().unwrap();
    let job = LogoJob::new(temp_dir.path().join("missing.png"), temp_dir.path().join("out.png"));

    let (buffer, out) = capture();
    let status = remove_logo_background(&job, disc_processor(), out).await;

    assert_eq!(status, EXIT_FAILURE);
    let text = captured_text(&buffer);
    assert!(text.contains("❌ Error: "));
    assert!(text.contains("missing.png"));
    assert!(text.ends_with("\n⚠️  Background removal failed\n"));
    assert!(!job.output.exists());
}

#[test]
fn test_binary_without_logo_exits_one() {
    let work_dir = TempDir::new().unwrap();
    let model_home = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_remove-logo-background"))
        .current_dir(work_dir.path())
        .env("U2NET_HOME", model_home.path())
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run remove-logo-background");

    assert_eq!(output.status.code(), Some(1));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("📂 Input: public/peterson-pro-services-logo.png"));
    assert!(stdout.contains("💾 Output: public/peterson-pro-services-logo-transparent.png"));
    assert!(stdout.contains("❌ Error: "));
    assert!(stdout.contains("⚠️  Background removal failed"));

    // Nothing was created: no output and no model download
    assert_eq!(fs::read_dir(work_dir.path()).unwrap().count(), 0);
    assert_eq!(fs::read_dir(model_home.path()).unwrap().count(), 0);
}
