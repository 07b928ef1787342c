#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Logo Background Removal
//!
//! Removes the background from the Peterson Pro Services logo with a
//! pretrained U²-Net salient object segmentation network, producing a PNG
//! with a transparent background at the original resolution.
//!
//! The network runs on ONNX Runtime or on the pure Rust Tract engine. Models
//! come from a small registry (`u2net`, `u2netp`, `u2net_human_seg`,
//! `silueta`, `isnet-general-use`), are downloaded once into `~/.u2net` (or
//! `$U2NET_HOME`) and loaded from there afterwards. Local ONNX files work too.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use logo_bgremove::{remove_background_from_file, RemovalConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::default();
//! let result = remove_background_from_file(
//!     "public/peterson-pro-services-logo.png",
//!     "public/peterson-pro-services-logo-transparent.png",
//!     &config,
//! )
//! .await?;
//! println!("{}", result.timing_summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA and `CoreML` providers
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): the `remove-logo-background` binary, log subscriber
//!   setup and download progress bars
//!
//! ## Custom Models
//!
//! ```rust,no_run
//! use logo_bgremove::{ModelSource, ModelSpec, RemovalConfig, BackendType};
//!
//! let config = RemovalConfig::builder()
//!     .model_spec(ModelSpec {
//!         source: ModelSource::External("models/u2netp.onnx".into()),
//!         variant: None,
//!     })
//!     .backend_type(BackendType::Tract)
//!     .build()
//!     .unwrap();
//! ```

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::path::Path;

// Public API exports
pub use backends::*;
pub use cache::ModelCache;
pub use config::{ExecutionProvider, LogoJob, RemovalConfig, RemovalConfigBuilder};
pub use download::{ensure_model_available, validate_model_url, ModelDownloader};
pub use error::{BgRemovalError, Result};
pub use inference::InferenceBackend;
pub use models::{
    KnownModel, ModelInfo, ModelManager, ModelSource, ModelSpec, PreprocessingConfig,
};
pub use processor::{
    BackendFactory, BackendType, BackgroundRemovalProcessor, DefaultBackendFactory,
};
pub use services::{
    ImageIOService, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker,
    ProgressUpdate,
};
pub use types::{
    MaskStatistics, ProcessingMetadata, ProcessingTimings, RemovalResult, SegmentationMask,
};
pub use utils::ImagePreprocessor;

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig};

/// Remove the background from a `DynamicImage`
///
/// Async because the model may have to be downloaded first. The result has
/// the same dimensions as `image`.
///
/// # Examples
///
/// ```rust,no_run
/// use logo_bgremove::{remove_background_from_image, RemovalConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let img = image::open("logo.jpg")?;
/// let result = remove_background_from_image(img, &RemovalConfig::default()).await?;
/// result.save_png("logo-transparent.png")?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_image(
    image: image::DynamicImage,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.prepare().await?;
    processor.process_image(&image)
}

/// Remove the background from encoded image bytes
///
/// # Examples
///
/// ```rust,no_run
/// use logo_bgremove::{remove_background_from_bytes, RemovalConfig};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let result = remove_background_from_bytes(&upload, &RemovalConfig::default()).await?;
/// let png = result.to_png_bytes()?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let image = image::load_from_memory(image_bytes).map_err(|e| {
        BgRemovalError::processing(format!("Failed to decode image from bytes: {}", e))
    })?;

    remove_background_from_image(image, config).await
}

/// Load `input`, remove its background and save the result to `output` as PNG
///
/// The input is read before the model is resolved, so a missing input fails
/// without touching the network. `output` is only written when every step
/// succeeded, and then replaced atomically.
pub async fn remove_background_from_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_file_to_png(input, output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_input_fails_without_model() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("out.png");
        // An unavailable model would fail too, so the error kind proves the order
        let config = RemovalConfig::builder().auto_download(false).build().unwrap();

        let err = remove_background_from_file(temp_dir.path().join("in.png"), &output, &config)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_undecodable_bytes() {
        let err = remove_background_from_bytes(b"definitely not a png", &RemovalConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("decode"));
    }
}
