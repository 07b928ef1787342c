//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use crate::models::{KnownModel, ModelSource, ModelSpec};
use crate::processor::BackendType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Logo the site ships with
pub const DEFAULT_INPUT_PATH: &str = "public/peterson-pro-services-logo.png";

/// Where the transparent copy of the logo is written
pub const DEFAULT_OUTPUT_PATH: &str = "public/peterson-pro-services-logo-transparent.png";

/// Upper bound accepted for runtime thread counts
const MAX_THREADS: usize = 1024;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{}'. Expected one of: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// The single input/output pair the command-line tool processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoJob {
    /// Source image
    pub input: PathBuf,
    /// Destination PNG with alpha channel
    pub output: PathBuf,
}

impl LogoJob {
    /// Create a job for an arbitrary pair of paths
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
        }
    }
}

impl Default for LogoJob {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_PATH, DEFAULT_OUTPUT_PATH)
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Model specification including source and variant
    pub model_spec: ModelSpec,

    /// Inference engine used to run the model
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Download a missing registry model into the cache before processing
    pub auto_download: bool,

    /// Binarise the mask at this value (`None` keeps soft edges)
    pub mask_threshold: Option<u8>,

    /// Enable debug mode (additional logging and validation)
    pub debug: bool,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::default(),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0, // Auto-detect optimal intra-op threads
            inter_threads: 0, // Auto-detect optimal inter-op threads
            auto_download: true,
            mask_threshold: None,
            debug: false,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use logo_bgremove::{BackendType, ExecutionProvider, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .backend_type(BackendType::Tract)
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .auto_download(false)
    ///     .build()
    ///     .unwrap();
    /// assert!(!config.auto_download);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - Thread counts: 0 (auto) up to 1024
    /// - External model paths must not be empty
    /// - Downloaded models must name an entry of the model registry
    ///
    /// # Errors
    /// - Thread count out of range
    /// - Empty external model path
    /// - Unknown downloaded model identifier
    pub fn validate(&self) -> Result<()> {
        if self.intra_threads > MAX_THREADS {
            return Err(BgRemovalError::config_value_error(
                "intra-op thread count",
                self.intra_threads,
                "0-1024",
                Some(0),
            ));
        }

        if self.inter_threads > MAX_THREADS {
            return Err(BgRemovalError::config_value_error(
                "inter-op thread count",
                self.inter_threads,
                "0-1024",
                Some(0),
            ));
        }

        match &self.model_spec.source {
            ModelSource::External(path) if path.as_os_str().is_empty() => {
                return Err(BgRemovalError::invalid_config(
                    "External model path must not be empty",
                ));
            },
            ModelSource::Downloaded(model_id) if KnownModel::find(model_id).is_none() => {
                return Err(BgRemovalError::invalid_config(format!(
                    "Unknown model '{}'. Known models: {}",
                    model_id,
                    KnownModel::names().join(", ")
                )));
            },
            _ => {},
        }

        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Set the model specification
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    /// Set the inference backend
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Set number of inter-op threads
    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both intra and inter threads (convenience method)
    ///
    /// Intra-op threads get `threads`, inter-op threads get `threads / 2`
    /// (minimum 1). Passing 0 keeps both on auto-detection.
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        if threads == 0 {
            self.config.intra_threads = 0;
            self.config.inter_threads = 0;
        } else {
            self.config.intra_threads = threads;
            self.config.inter_threads = (threads / 2).max(1);
        }
        self
    }

    /// Allow or forbid downloading a missing model
    #[must_use]
    pub fn auto_download(mut self, enabled: bool) -> Self {
        self.config.auto_download = enabled;
        self
    }

    /// Binarise the mask at the given value
    #[must_use]
    pub fn mask_threshold(mut self, threshold: Option<u8>) -> Self {
        self.config.mask_threshold = threshold;
        self
    }

    /// Enable debug mode
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build the configuration, validating it first
    ///
    /// # Errors
    /// - Any rule checked by [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
