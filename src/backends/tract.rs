//! Tract backend for the U2-Net family of segmentation models
//!
//! Pure Rust CPU inference with no native runtime to install. Slower than
//! ONNX Runtime, but the same model files and the same results.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use instant::{Duration, Instant};
use ndarray::Array4;
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running background removal models using pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: ModelManager,
    initialized: bool,
}

impl TractBackend {
    /// List Tract execution providers; only CPU exists
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    /// Create a Tract backend for the given model
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager,
            initialized: false,
        }
    }

    /// Load and optimize the model
    fn load_model(&mut self, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        if !matches!(
            config.execution_provider,
            ExecutionProvider::Auto | ExecutionProvider::Cpu
        ) {
            log::warn!(
                "Tract runs on CPU only; ignoring execution provider {}",
                config.execution_provider
            );
        }

        let model_data = self.model_manager.load_model()?;
        let model_info = self.model_manager.get_info()?;
        let (batch, channels, height, width) = model_info.input_shape;

        log::info!(
            "Initializing Tract backend: model {} ({}), {:.2} MB",
            model_info.name,
            model_info.precision,
            model_info.size_bytes as f64 / (1024.0 * 1024.0)
        );

        // Pin the input so the dynamic batch/spatial axes of the export resolve
        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| BgRemovalError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([batch, channels, height, width]).into())
            .map_err(|e| BgRemovalError::model(format!("Failed to set model input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgRemovalError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                BgRemovalError::model(format!("Failed to create runnable model: {e}"))
            })?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None); // No model loading time for already initialized backend
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgRemovalError::inference("Tract model not initialized"))?;

        log::debug!("Running Tract inference on input {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        // First output is the fused saliency map
        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = match *output_data.shape() {
            [n, c, h, w] => (n, c, h, w),
            [n, h, w] => (n, 1, h, w),
            ref other => {
                return Err(BgRemovalError::inference(format!(
                    "Expected 4D output tensor, got {}D",
                    other.len()
                )));
            },
        };

        let output_array = Array4::from_shape_vec(shape, output_data.iter().copied().collect())
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to reshape output tensor: {e}"))
            })?;

        log::debug!(
            "Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );

        Ok(output_array)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .get_info()
            .map_or((1, 3, 320, 320), |info| info.input_shape)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .get_info()
            .map_or((1, 1, 320, 320), |info| info.output_shape)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.model_manager.get_preprocessing_config()
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        self.model_manager.get_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend_for(file_name: &str) -> (TempDir, TractBackend) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(file_name);
        std::fs::write(&path, b"not an onnx graph").unwrap();
        let manager = ModelManager::with_external_model(&path, None).unwrap();
        (temp_dir, TractBackend::with_model_manager(manager))
    }

    #[test]
    fn test_shapes_follow_model_registry() {
        let (_dir, backend) = backend_for("isnet-general-use.onnx");
        assert!(!backend.is_initialized());
        assert_eq!(backend.input_shape(), (1, 3, 1024, 1024));
        assert_eq!(backend.output_shape(), (1, 1, 1024, 1024));
        assert_eq!(
            backend.get_preprocessing_config().unwrap().target_size,
            [1024, 1024]
        );
    }

    #[test]
    fn test_invalid_model_fails_initialization() {
        let (_dir, mut backend) = backend_for("u2net.onnx");
        let result = backend.initialize(&RemovalConfig::default());
        assert!(matches!(result, Err(BgRemovalError::Model(_))));
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_infer_before_initialize() {
        let (_dir, mut backend) = backend_for("u2net.onnx");
        let result = backend.infer(&Array4::zeros((1, 3, 320, 320)));
        assert!(matches!(result, Err(BgRemovalError::Inference(_))));
    }

    #[test]
    fn test_list_providers() {
        let providers = TractBackend::list_providers();
        assert_eq!(providers.len(), 1);
        assert!(providers[0].1);
    }
}
