//! Logo background removal command
//!
//! Takes no arguments: reads the site logo from its fixed path, writes the
//! transparent copy next to it and reports each step on stdout.

use crate::{
    config::{LogoJob, RemovalConfig},
    processor::BackgroundRemovalProcessor,
    services::{ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate},
    tracing_config::{init_cli_tracing, session_span},
    types::ProcessingTimings,
};
use anyhow::{Context, Result};
use std::io::Write;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, Instrument};

/// Exit status after the transparent logo was written
pub const EXIT_SUCCESS: u8 = 0;

/// Exit status for any failure
pub const EXIT_FAILURE: u8 = 1;

/// Destination for the user-facing status lines
pub type SharedOutput = Arc<Mutex<dyn Write + Send>>;

fn write_line(out: &SharedOutput, line: &str) {
    if let Ok(mut writer) = out.lock() {
        // Status lines are best effort; a closed stdout must not change the exit status
        let _ = writeln!(writer, "{}", line);
    }
}

/// Progress reporter printing the tool's status lines
pub struct LogoConsoleReporter {
    out: SharedOutput,
}

impl LogoConsoleReporter {
    /// Create a reporter writing to `out`
    #[must_use]
    pub fn new(out: SharedOutput) -> Self {
        Self { out }
    }
}

impl ProgressReporter for LogoConsoleReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        match (update.stage, update.dimensions) {
            (ProcessingStage::ImageLoading, Some((width, height))) => {
                write_line(&self.out, &format!("✓ Loaded image: {}x{} pixels", width, height));
            },
            (ProcessingStage::Initialization, _) => {
                write_line(
                    &self.out,
                    "🤖 Applying AI background removal (this may take a moment)...",
                );
            },
            (ProcessingStage::ModelDownload, _) => {
                info!("Segmentation model not cached yet, downloading it first");
            },
            (stage, _) => {
                debug!(
                    stage = ?stage,
                    progress = update.progress,
                    elapsed_ms = update.elapsed_ms,
                    "{}",
                    update.description
                );
            },
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        debug!(total_ms = timings.total_ms, inference_ms = timings.inference_ms, "Run finished");
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        error!(stage = ?stage, "{}", error);
    }
}

/// Processor for the command-line run: default model, ONNX Runtime, auto provider
///
/// # Errors
/// - Invalid default configuration
pub fn build_processor() -> Result<BackgroundRemovalProcessor> {
    let config = RemovalConfig::builder()
        .build()
        .context("Invalid background removal configuration")?;
    BackgroundRemovalProcessor::new(config).context("Failed to create background removal processor")
}

/// Run one job and print the status lines, returning the exit status
pub async fn remove_logo_background(
    job: &LogoJob,
    mut processor: BackgroundRemovalProcessor,
    out: SharedOutput,
) -> u8 {
    write_line(&out, "🎨 Processing logo with elite-tier background removal...");
    write_line(&out, &format!("📂 Input: {}", job.input.display()));
    write_line(&out, &format!("💾 Output: {}", job.output.display()));

    processor.set_progress_tracker(ProgressTracker::new(Box::new(LogoConsoleReporter::new(
        Arc::clone(&out),
    ))));

    match processor.process_file_to_png(&job.input, &job.output).await {
        Ok(result) => {
            let (width, height) = result.dimensions();
            write_line(
                &out,
                &format!("✅ Success! Transparent logo saved to: {}", job.output.display()),
            );
            write_line(&out, &format!("📊 Output size: {}x{} pixels", width, height));
            info!("{}", result.timing_summary());
            if let Ok(metadata) = serde_json::to_string(&result.metadata) {
                debug!(%metadata, "Processing metadata");
            }

            write_line(&out, "\n🎉 Background removal complete!");
            write_line(
                &out,
                "📝 Next step: Replace the original logo with the transparent version",
            );
            EXIT_SUCCESS
        },
        Err(e) => report_failure(&out, &e),
    }
}

fn report_failure(out: &SharedOutput, error: &dyn std::fmt::Display) -> u8 {
    write_line(out, &format!("❌ Error: {}", error));
    write_line(out, "\n⚠️  Background removal failed");
    EXIT_FAILURE
}

/// Entry point of the `remove-logo-background` binary
pub async fn main() -> ExitCode {
    let session_id = match init_cli_tracing(0) {
        Ok(session_id) => session_id,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            String::new()
        },
    };

    let job = LogoJob::default();
    let out: SharedOutput = Arc::new(Mutex::new(std::io::stdout()));

    let status = match build_processor() {
        Ok(processor) => {
            remove_logo_background(&job, processor, Arc::clone(&out))
                .instrument(session_span(&session_id, &job))
                .await
        },
        Err(e) => report_failure(&out, &format!("{:#}", e)),
    };

    ExitCode::from(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackend;
    use tempfile::TempDir;

    fn captured() -> (Arc<Mutex<Vec<u8>>>, SharedOutput) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let out: SharedOutput = buffer.clone();
        (buffer, out)
    }

    fn text(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
    }

    fn mock_processor() -> BackgroundRemovalProcessor {
        BackgroundRemovalProcessor::with_backend(
            RemovalConfig::default(),
            Box::new(MockBackend::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_lines_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let job = LogoJob::new(
            temp_dir.path().join("logo.png"),
            temp_dir.path().join("logo-t.png"),
        );
        image::RgbImage::from_pixel(30, 20, image::Rgb([9, 9, 9]))
            .save(&job.input)
            .unwrap();

        let (buffer, out) = captured();
        let status = remove_logo_background(&job, mock_processor(), out).await;
        assert_eq!(status, EXIT_SUCCESS);

        let output = text(&buffer);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "🎨 Processing logo with elite-tier background removal...");
        assert_eq!(lines[1], format!("📂 Input: {}", job.input.display()));
        assert_eq!(lines[2], format!("💾 Output: {}", job.output.display()));
        assert_eq!(lines[3], "✓ Loaded image: 30x20 pixels");
        assert_eq!(lines[4], "🤖 Applying AI background removal (this may take a moment)...");
        assert_eq!(
            lines[5],
            format!("✅ Success! Transparent logo saved to: {}", job.output.display())
        );
        assert_eq!(lines[6], "📊 Output size: 30x20 pixels");
        assert_eq!(lines[7], "");
        assert_eq!(lines[8], "🎉 Background removal complete!");
        assert_eq!(
            lines[9],
            "📝 Next step: Replace the original logo with the transparent version"
        );
    }

    #[tokio::test]
    async fn test_missing_input_reports_failure() {
        let temp_dir = TempDir::new().unwrap();
        let job = LogoJob::new(temp_dir.path().join("absent.png"), temp_dir.path().join("out.png"));

        let (buffer, out) = captured();
        let status = remove_logo_background(&job, mock_processor(), out).await;
        assert_eq!(status, EXIT_FAILURE);
        assert!(!job.output.exists());

        let output = text(&buffer);
        assert!(output.contains("❌ Error: "));
        assert!(output.contains("absent.png"));
        assert!(output.ends_with("\n⚠️  Background removal failed\n"));
        assert!(!output.contains("✓ Loaded image"));
        assert!(!output.contains("🎉"));
    }

    #[test]
    fn test_default_processor_builds() {
        let processor = build_processor().unwrap();
        assert!(!processor.is_initialized());
        assert!(processor.config().auto_download);
    }
}
