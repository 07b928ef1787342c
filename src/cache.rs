//! Model cache management for downloaded models
//!
//! Models live as flat `<name>.onnx` files in a single directory, the same
//! layout the rembg tooling uses, so a model fetched by either tool is reused
//! by the other. Downloads made by this crate also leave a `<name>.onnx.sha256`
//! record next to the model that is checked whenever the model is loaded.

use crate::error::{BgRemovalError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache location
pub const CACHE_DIR_ENV: &str = "U2NET_HOME";

const MODEL_EXTENSION: &str = "onnx";
const CHECKSUM_EXTENSION: &str = "onnx.sha256";

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache manager
    ///
    /// The cache directory is `$U2NET_HOME` when set, otherwise `~/.u2net`.
    ///
    /// # Errors
    /// - Failed to determine the home directory
    /// - Failed to create cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::get_cache_dir()?;
        Self::with_custom_cache_dir(&cache_dir)
    }

    /// Resolve the cache directory path
    ///
    /// # Errors
    /// - Neither `U2NET_HOME` nor a home directory is available
    fn get_cache_dir() -> Result<PathBuf> {
        if let Some(cache_override) = std::env::var_os(CACHE_DIR_ENV) {
            if !cache_override.is_empty() {
                return Ok(PathBuf::from(cache_override));
            }
        }

        Ok(dirs::home_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Failed to determine home directory. Set the {} environment variable.",
                    CACHE_DIR_ENV
                ))
            })?
            .join(".u2net"))
    }

    /// Create a model cache rooted at a custom directory
    ///
    /// # Errors
    /// - Failed to create cache directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(cache_dir).map_err(|e| {
                BgRemovalError::file_io_error("create cache directory", cache_dir, &e)
            })?;
        }

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    /// Get the current cache directory path
    #[must_use]
    pub fn get_current_cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    /// Path of the model file for a registry name (may not exist)
    #[must_use]
    pub fn model_file_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", model_id, MODEL_EXTENSION))
    }

    /// Path of the recorded download checksum (may not exist)
    #[must_use]
    pub fn checksum_file_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", model_id, CHECKSUM_EXTENSION))
    }

    /// Check if a model is cached
    ///
    /// # Returns
    /// `true` if the model file exists and is not empty
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        fs::metadata(self.model_file_path(model_id))
            .map(|metadata| metadata.is_file() && metadata.len() > 0)
            .unwrap_or(false)
    }

    /// Record the SHA-256 of a freshly downloaded model
    ///
    /// # Errors
    /// - Failed to write the checksum file
    pub fn record_checksum(&self, model_id: &str, digest_hex: &str) -> Result<()> {
        let path = self.checksum_file_path(model_id);
        fs::write(&path, format!("{}\n", digest_hex))
            .map_err(|e| BgRemovalError::file_io_error("write model checksum", &path, &e))
    }

    /// Read the recorded checksum, if any
    ///
    /// # Errors
    /// - Checksum file exists but cannot be read
    pub fn recorded_checksum(&self, model_id: &str) -> Result<Option<String>> {
        let path = self.checksum_file_path(model_id);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content.trim().to_lowercase())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BgRemovalError::file_io_error("read model checksum", &path, &e)),
        }
    }

    /// Check loaded model bytes against the recorded download checksum
    ///
    /// Models without a record (placed by another tool) are accepted.
    ///
    /// # Errors
    /// - Checksum file exists but cannot be read
    pub fn verify_model_bytes(&self, model_id: &str, data: &[u8]) -> Result<bool> {
        let Some(expected) = self.recorded_checksum(model_id)? else {
            return Ok(true);
        };

        let actual = sha256_hex(data);
        if actual != expected {
            log::warn!(
                "Checksum mismatch for cached model {}: expected {}, got {}",
                model_id,
                expected,
                actual
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// Lowercase hex SHA-256 of a byte slice
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
