//! Model registry, model sources and model loading

use crate::cache::ModelCache;
use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Identifier of the model used when nothing else is configured
pub const DEFAULT_MODEL_ID: &str = "u2net";

const U2NET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const U2NET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A pretrained segmentation model that can be downloaded into the cache
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KnownModel {
    /// Registry name, also the cached file stem
    pub name: &'static str,
    /// Download location of the ONNX file
    pub url: &'static str,
    /// Square input resolution expected by the network
    pub input_size: u32,
    /// Per-channel normalization mean (RGB)
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB)
    pub std: [f32; 3],
    /// Short human readable description
    pub description: &'static str,
}

const REGISTRY: &[KnownModel] = &[
    KnownModel {
        name: "u2net",
        url: "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx",
        input_size: 320,
        mean: U2NET_MEAN,
        std: U2NET_STD,
        description: "U2-Net, general purpose salient object segmentation",
    },
    KnownModel {
        name: "u2netp",
        url: "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2netp.onnx",
        input_size: 320,
        mean: U2NET_MEAN,
        std: U2NET_STD,
        description: "U2-Net lightweight variant",
    },
    KnownModel {
        name: "u2net_human_seg",
        url: "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net_human_seg.onnx",
        input_size: 320,
        mean: U2NET_MEAN,
        std: U2NET_STD,
        description: "U2-Net trained for human segmentation",
    },
    KnownModel {
        name: "silueta",
        url: "https://github.com/danielgatis/rembg/releases/download/v0.0.0/silueta.onnx",
        input_size: 320,
        mean: U2NET_MEAN,
        std: U2NET_STD,
        description: "U2-Net pruned to 43 MB",
    },
    KnownModel {
        name: "isnet-general-use",
        url: "https://github.com/danielgatis/rembg/releases/download/v0.0.0/isnet-general-use.onnx",
        input_size: 1024,
        mean: U2NET_MEAN,
        std: [1.0, 1.0, 1.0],
        description: "IS-Net general use dichotomous segmentation",
    },
];

impl KnownModel {
    /// All registry entries
    #[must_use]
    pub fn all() -> &'static [KnownModel] {
        REGISTRY
    }

    /// Look up a registry entry by name
    #[must_use]
    pub fn find(name: &str) -> Option<&'static KnownModel> {
        REGISTRY.iter().find(|model| model.name == name)
    }

    /// Registry names, in registry order
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        REGISTRY.iter().map(|model| model.name).collect()
    }

    /// The default model
    #[must_use]
    pub fn default_model() -> &'static KnownModel {
        // REGISTRY is a non-empty constant and DEFAULT_MODEL_ID is its first entry
        REGISTRY
            .iter()
            .find(|model| model.name == DEFAULT_MODEL_ID)
            .unwrap_or(&REGISTRY[0])
    }

    /// Preprocessing parameters for this model
    #[must_use]
    pub fn preprocessing_config(&self) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [self.input_size, self.input_size],
            normalization_mean: self.mean,
            normalization_std: self.std,
        }
    }
}

/// Model source specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelSource {
    /// External model from filesystem path
    External(PathBuf),
    /// Downloaded model from cache by registry name
    Downloaded(String),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
            ModelSource::Downloaded(model_id) => {
                format!("cached:{}", model_id)
            },
        }
    }
}

/// Complete model specification including source and optional variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
    pub variant: Option<String>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            source: ModelSource::Downloaded(DEFAULT_MODEL_ID.to_string()),
            variant: None,
        }
    }
}

/// Image preprocessing parameters a model expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Network input size as `[width, height]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        KnownModel::default_model().preprocessing_config()
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

impl ModelInfo {
    fn for_preprocessing(
        name: String,
        precision: String,
        size_bytes: usize,
        config: &PreprocessingConfig,
    ) -> Self {
        let width = config.target_size[0] as usize;
        let height = config.target_size[1] as usize;
        Self {
            name,
            precision,
            size_bytes,
            input_shape: (1, 3, height, width),
            output_shape: (1, 1, height, width),
        }
    }
}

/// Model provider trait for loading models
pub trait ModelProvider: std::fmt::Debug {
    /// Load model data as bytes
    ///
    /// # Errors
    /// - Model file not found or inaccessible
    /// - Cached model fails its integrity check
    fn load_model_data(&self) -> Result<Vec<u8>>;

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata unavailable
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Get preprocessing configuration
    ///
    /// # Errors
    /// - No preprocessing parameters known for the model
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Get the model file path
    ///
    /// # Errors
    /// - Model path not available for this provider type
    fn get_model_path(&self) -> Result<PathBuf>;
}

/// Provider for an ONNX file given by path
#[derive(Debug)]
pub struct ExternalModelProvider {
    model_path: PathBuf,
    preprocessing: PreprocessingConfig,
    variant: String,
}

impl ExternalModelProvider {
    /// Create provider for an external `.onnx` file, or a directory holding `model.onnx`
    ///
    /// Preprocessing parameters come from the registry entry whose name
    /// matches the file stem; unknown files use the U2-Net parameters.
    ///
    /// # Errors
    /// - Model path does not exist
    pub fn new<P: AsRef<Path>>(model_path: P, variant: Option<String>) -> Result<Self> {
        let mut model_path = model_path.as_ref().to_path_buf();
        if model_path.is_dir() {
            model_path = model_path.join("model.onnx");
        }

        if !model_path.is_file() {
            return Err(BgRemovalError::model_error_with_context(
                "locate",
                &model_path,
                "file does not exist",
                &["check the model path", "use a downloaded model instead"],
            ));
        }

        let preprocessing = model_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(KnownModel::find)
            .map(KnownModel::preprocessing_config)
            .unwrap_or_default();

        Ok(Self {
            model_path,
            preprocessing,
            variant: variant.unwrap_or_else(|| "fp32".to_string()),
        })
    }
}

impl ModelProvider for ExternalModelProvider {
    fn load_model_data(&self) -> Result<Vec<u8>> {
        fs::read(&self.model_path)
            .map_err(|e| BgRemovalError::file_io_error("read model file", &self.model_path, &e))
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let metadata = fs::metadata(&self.model_path).map_err(|e| {
            BgRemovalError::file_io_error("inspect model file", &self.model_path, &e)
        })?;
        let name = self
            .model_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Ok(ModelInfo::for_preprocessing(
            name,
            self.variant.clone(),
            metadata.len() as usize,
            &self.preprocessing,
        ))
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing.clone())
    }

    fn get_model_path(&self) -> Result<PathBuf> {
        Ok(self.model_path.clone())
    }
}

/// Provider for a registry model stored in the cache
#[derive(Debug)]
pub struct DownloadedModelProvider {
    model: &'static KnownModel,
    model_path: PathBuf,
    variant: String,
    cache: ModelCache,
}

impl DownloadedModelProvider {
    /// Create a provider for a cached registry model
    ///
    /// # Errors
    /// - Unknown model identifier
    /// - Model not found in cache
    pub fn new(model_id: &str, variant: Option<String>) -> Result<Self> {
        Self::with_cache(ModelCache::new()?, model_id, variant)
    }

    /// Create a provider backed by an explicit cache
    ///
    /// # Errors
    /// - Unknown model identifier
    /// - Model not found in cache
    pub fn with_cache(cache: ModelCache, model_id: &str, variant: Option<String>) -> Result<Self> {
        let model = KnownModel::find(model_id).ok_or_else(|| {
            BgRemovalError::model(format!(
                "Unknown model '{}'. Known models: {}",
                model_id,
                KnownModel::names().join(", ")
            ))
        })?;

        if !cache.is_model_cached(model_id) {
            return Err(BgRemovalError::model_error_with_context(
                "load",
                cache.model_file_path(model_id),
                "model is not cached",
                &["enable automatic downloads", "set U2NET_HOME to an existing model directory"],
            ));
        }

        Ok(Self {
            model,
            model_path: cache.model_file_path(model_id),
            variant: variant.unwrap_or_else(|| "fp32".to_string()),
            cache,
        })
    }

    /// Get the cache this provider reads from
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Get the registry name
    #[must_use]
    pub fn model_id(&self) -> &str {
        self.model.name
    }
}

impl ModelProvider for DownloadedModelProvider {
    fn load_model_data(&self) -> Result<Vec<u8>> {
        let data = fs::read(&self.model_path)
            .map_err(|e| BgRemovalError::file_io_error("read cached model", &self.model_path, &e))?;

        if !self.cache.verify_model_bytes(self.model.name, &data)? {
            return Err(BgRemovalError::model_error_with_context(
                "verify",
                &self.model_path,
                "checksum does not match the recorded download",
                &["delete the cached file to download it again"],
            ));
        }

        log::debug!(
            "Loaded cached model {} ({} bytes)",
            self.model.name,
            data.len()
        );
        Ok(data)
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let metadata = fs::metadata(&self.model_path).map_err(|e| {
            BgRemovalError::file_io_error("inspect cached model", &self.model_path, &e)
        })?;

        Ok(ModelInfo::for_preprocessing(
            self.model.name.to_string(),
            self.variant.clone(),
            metadata.len() as usize,
            &self.model.preprocessing_config(),
        ))
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.model.preprocessing_config())
    }

    fn get_model_path(&self) -> Result<PathBuf> {
        Ok(self.model_path.clone())
    }
}

/// Model manager for handling different model sources
#[derive(Debug)]
pub struct ModelManager {
    provider: Box<dyn ModelProvider>,
}

impl ModelManager {
    /// Create a new model manager from a model specification
    ///
    /// # Errors
    /// - External model path does not exist
    /// - Downloaded model unknown or not cached
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        match &spec.source {
            ModelSource::External(model_path) => {
                Self::with_external_model(model_path, spec.variant.clone())
            },
            ModelSource::Downloaded(model_id) => {
                Self::with_downloaded_model(model_id, spec.variant.clone())
            },
        }
    }

    /// Create model manager with an external model file
    ///
    /// # Errors
    /// - Model path does not exist
    pub fn with_external_model<P: AsRef<Path>>(
        model_path: P,
        variant: Option<String>,
    ) -> Result<Self> {
        let provider = ExternalModelProvider::new(model_path, variant)?;
        Ok(Self {
            provider: Box::new(provider),
        })
    }

    /// Create model manager with a downloaded model from the cache
    ///
    /// # Errors
    /// - Unknown model identifier
    /// - Model not found in cache
    pub fn with_downloaded_model(model_id: &str, variant: Option<String>) -> Result<Self> {
        let provider = DownloadedModelProvider::new(model_id, variant)?;
        Ok(Self {
            provider: Box::new(provider),
        })
    }

    /// Wrap an arbitrary provider
    #[must_use]
    pub fn with_provider(provider: Box<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    /// Load model data
    ///
    /// # Errors
    /// - Model file not found or inaccessible
    /// - Integrity check failures for cached models
    pub fn load_model(&self) -> Result<Vec<u8>> {
        self.provider.load_model_data()
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata unavailable
    pub fn get_info(&self) -> Result<ModelInfo> {
        self.provider.get_model_info()
    }

    /// Get preprocessing configuration
    ///
    /// # Errors
    /// - No preprocessing parameters known for the model
    pub fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.provider.get_preprocessing_config()
    }

    /// Get the model file path
    ///
    /// # Errors
    /// - Model path not available for this provider type
    pub fn get_model_path(&self) -> Result<PathBuf> {
        self.provider.get_model_path()
    }
}
