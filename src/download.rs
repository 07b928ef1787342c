//! Model downloading into the local cache
//!
//! Registry models are fetched over HTTPS with progress reporting. The body
//! is streamed into a temporary file inside the cache directory while being
//! hashed, and only renamed to `<name>.onnx` once the transfer completed, so
//! an interrupted download never leaves a truncated model behind.

use crate::cache::ModelCache;
use crate::error::{BgRemovalError, Result};
use crate::models::{KnownModel, ModelSource, ModelSpec};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Set message for progress indicator
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    /// Set length for progress indicator
    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    /// Set position for progress indicator
    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    /// Finish progress indicator with message
    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

impl ModelDownloader {
    /// Create a new model downloader for the default cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader writing into the given cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .timeout(std::time::Duration::from_secs(900)) // the largest models are ~180 MB
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Download a registry model into the cache
    ///
    /// Returns the cached model path. A model that is already cached is not
    /// downloaded again.
    ///
    /// # Errors
    /// - Model URL is not HTTPS
    /// - Network errors or non-success HTTP status
    /// - File system errors while writing into the cache
    pub async fn download_model(&self, model: &KnownModel, show_progress: bool) -> Result<PathBuf> {
        let final_path = self.cache.model_file_path(model.name);

        if self.cache.is_model_cached(model.name) {
            log::info!("Model already cached: {}", model.name);
            return Ok(final_path);
        }

        validate_model_url(model.url)?;
        log::info!("Downloading model {} from {}", model.name, model.url);

        let progress = if show_progress {
            Self::create_progress_indicator()
        } else {
            ProgressIndicator::NoOp
        };
        progress.set_message(format!("Downloading {}", model.name));

        match self.download_to_cache(model, &final_path, &progress).await {
            Ok(digest) => {
                self.cache.record_checksum(model.name, &digest)?;
                progress.finish_with_message(format!("✅ Downloaded {}", model.name));
                log::info!(
                    "Successfully downloaded model {} (sha256 {})",
                    model.name,
                    digest
                );
                Ok(final_path)
            },
            Err(e) => {
                progress.finish_with_message("❌ Download failed".to_string());
                Err(e)
            },
        }
    }

    /// Stream the model into a temp file next to `final_path` and persist it
    ///
    /// Returns the hex SHA-256 of the downloaded bytes.
    async fn download_to_cache(
        &self,
        model: &KnownModel,
        final_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<String> {
        let cache_dir = self.cache.get_current_cache_dir();
        let temp_file = tempfile::Builder::new()
            .prefix(&format!(".{}-", model.name))
            .suffix(".part")
            .tempfile_in(cache_dir)
            .map_err(|e| BgRemovalError::file_io_error("create temp file in", cache_dir, &e))?;

        let std_file = temp_file
            .reopen()
            .map_err(|e| BgRemovalError::file_io_error("open temp file", temp_file.path(), &e))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let response = self.client.get(model.url).send().await.map_err(|e| {
            BgRemovalError::network_error(format!("Failed to download {}", model.url), e)
        })?;

        if !response.status().is_success() {
            return Err(BgRemovalError::network_error(
                format!("Failed to download {}", model.url),
                format!("HTTP status {}", response.status()),
            ));
        }

        let total_size = response.content_length();
        if let Some(total) = total_size {
            progress.set_length(total);
        }

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break; // EOF
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BgRemovalError::file_io_error("write to", temp_file.path(), &e))?;

            downloaded += bytes_read as u64;
            if total_size.is_some() {
                progress.set_position(downloaded);
            } else {
                progress.set_message(format!(
                    "Downloaded {:.1} MB",
                    downloaded as f64 / 1_048_576.0
                ));
            }
        }

        if downloaded == 0 {
            return Err(BgRemovalError::network_error(
                format!("Failed to download {}", model.url),
                "empty response body",
            ));
        }

        if let Some(total) = total_size {
            if total != downloaded {
                return Err(BgRemovalError::network_error(
                    format!("Failed to download {}", model.url),
                    format!("received {} of {} bytes", downloaded, total),
                ));
            }
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush", temp_file.path(), &e))?;
        file.sync_all()
            .await
            .map_err(|e| BgRemovalError::file_io_error("sync", temp_file.path(), &e))?;
        drop(file);

        temp_file
            .persist(final_path)
            .map_err(|e| {
                BgRemovalError::file_io_error("move downloaded model to", final_path, &e.error)
            })?;

        log::debug!(
            "Downloaded {} bytes to {}",
            downloaded,
            final_path.display()
        );
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Create a progress indicator for download reporting
    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }
}

/// Validate that a model URL can be downloaded from
///
/// Only absolute `https://` URLs with a host and a file path are accepted.
///
/// # Errors
/// - Empty URL, non-HTTPS scheme or missing path
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(BgRemovalError::invalid_config(
            "Model URL cannot be empty".to_string(),
        ));
    }

    let Some(rest) = url.strip_prefix("https://") else {
        return Err(BgRemovalError::invalid_config(format!(
            "Unsupported URL: {}. Models are only downloaded over HTTPS",
            url
        )));
    };

    match rest.split_once('/') {
        Some((host, path)) if !host.is_empty() && !path.is_empty() => Ok(()),
        _ => Err(BgRemovalError::invalid_config(format!(
            "Invalid model URL: {}. Expected https://host/path/to/model.onnx",
            url
        ))),
    }
}

/// Make sure the model named by `spec` is available locally
///
/// External models must exist on disk. Registry models are looked up in the
/// cache and downloaded when missing, unless `auto_download` is false.
/// Returns the path the model will be loaded from.
///
/// # Errors
/// - External model file missing
/// - Unknown registry model
/// - Model not cached and downloading disabled
/// - Download failures
pub async fn ensure_model_available(spec: &ModelSpec, auto_download: bool) -> Result<PathBuf> {
    if let ModelSource::External(path) = &spec.source {
        return check_external_model(path);
    }
    ensure_model_available_in(ModelCache::new()?, spec, auto_download).await
}

/// Same as [`ensure_model_available`] with an explicit cache
///
/// # Errors
/// - Same as [`ensure_model_available`]
pub async fn ensure_model_available_in(
    cache: ModelCache,
    spec: &ModelSpec,
    auto_download: bool,
) -> Result<PathBuf> {
    match &spec.source {
        ModelSource::External(path) => check_external_model(path),
        ModelSource::Downloaded(model_id) => {
            let model = KnownModel::find(model_id).ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Unknown model '{}'. Known models: {}",
                    model_id,
                    KnownModel::names().join(", ")
                ))
            })?;

            if cache.is_model_cached(model_id) {
                return Ok(cache.model_file_path(model_id));
            }

            if !auto_download {
                return Err(BgRemovalError::model_error_with_context(
                    "load",
                    cache.model_file_path(model_id),
                    "model is not cached and automatic download is disabled",
                    &[
                        "enable auto_download in the configuration",
                        &format!("place {}.onnx in the cache directory", model_id),
                    ],
                ));
            }

            log::info!("Model '{}' not cached, downloading", model_id);
            ModelDownloader::with_cache(cache)?
                .download_model(model, true)
                .await
        },
    }
}

fn check_external_model(path: &Path) -> Result<PathBuf> {
    let model_path = if path.is_dir() {
        path.join("model.onnx")
    } else {
        path.to_path_buf()
    };

    if model_path.is_file() {
        Ok(model_path)
    } else {
        Err(BgRemovalError::model_error_with_context(
            "load",
            &model_path,
            "model file not found",
            &["check the external model path"],
        ))
    }
}
