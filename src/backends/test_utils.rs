//! Mock backend for testing inference without model files
//!
//! The mock returns a deterministic saliency map so processor and pipeline
//! tests can assert on exact mask values without ONNX Runtime or Tract.

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{KnownModel, ModelInfo, ModelManager, PreprocessingConfig},
    processor::{BackendFactory, BackendType},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Saliency map produced by [`MockBackend`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockOutput {
    /// Soft disc centred in the frame
    Circle,
    /// Every pixel has the same raw value
    Constant(f32),
    /// Left half background, right half foreground
    SplitVertical,
}

/// Mock backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    model_info: ModelInfo,
    preprocessing_config: PreprocessingConfig,
    output: MockOutput,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    /// Create a mock mirroring the default U2-Net geometry
    #[must_use]
    pub fn new() -> Self {
        Self::with_size(KnownModel::default_model().input_size as usize)
    }

    /// Create a mock with a square input of `size` pixels
    #[must_use]
    pub fn with_size(size: usize) -> Self {
        Self {
            initialized: false,
            model_info: ModelInfo {
                name: "mock-u2net".to_string(),
                precision: "fp32".to_string(),
                size_bytes: 1024 * 1024,
                input_shape: (1, 3, size, size),
                output_shape: (1, 1, size, size),
            },
            preprocessing_config: PreprocessingConfig {
                target_size: [size as u32, size as u32],
                ..PreprocessingConfig::default()
            },
            output: MockOutput::Circle,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    /// Select the produced saliency map
    #[must_use]
    pub fn with_output(mut self, output: MockOutput) -> Self {
        self.output = output;
        self
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new();
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new();
        backend.should_fail_inference = true;
        backend
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn generate_mock_output(&self) -> Array4<f32> {
        let (_, _, height, width) = self.model_info.output_shape;
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = width.min(height) as f32 / 3.0;

        Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| match self.output {
            MockOutput::Circle => {
                let dx = x as f32 - center_x;
                let dy = y as f32 - center_y;
                let distance = (dx * dx + dy * dy).sqrt();
                // Raw logits-like range to exercise min-max normalization
                ((radius - distance) / radius).clamp(0.0, 1.0) * 4.0 - 2.0
            },
            MockOutput::Constant(value) => value,
            MockOutput::SplitVertical => {
                if x < width / 2 {
                    0.0
                } else {
                    1.0
                }
            },
        })
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(BgRemovalError::model("Mock backend initialization failed"));
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(5)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(BgRemovalError::inference("Mock backend not initialized"));
        }

        if self.should_fail_inference {
            return Err(BgRemovalError::inference("Mock backend inference failed"));
        }

        let (batch, channels, height, width) = self.model_info.input_shape;
        if input.shape() != [batch, channels, height, width] {
            return Err(BgRemovalError::inference(format!(
                "Unexpected input shape {:?}",
                input.shape()
            )));
        }

        Ok(self.generate_mock_output())
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_info.input_shape
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_info.output_shape
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing_config.clone())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(self.model_info.clone())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Test factory handing out mock backends
#[derive(Debug, Default)]
pub struct MockBackendFactory {
    /// Fail backend creation entirely
    pub fail_backend_creation: bool,
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        _model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        if self.fail_backend_creation {
            return Err(BgRemovalError::model(
                "Mock factory configured to fail backend creation",
            ));
        }
        Ok(Box::new(MockBackend::new()))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}

/// Helpers for building test images
pub mod test_helpers {
    use image::{DynamicImage, ImageBuffer, Rgb, Rgba};

    /// Create an RGB gradient image
    pub fn create_test_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            Rgb([r, g, 128])
        });
        DynamicImage::ImageRgb8(img)
    }

    /// Create an opaque RGBA image of a single colour
    pub fn create_solid_rgba(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba(color)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_call_history() {
        let mut backend = MockBackend::new();
        backend.initialize(&RemovalConfig::default()).unwrap();
        backend.infer(&Array4::zeros((1, 3, 320, 320))).unwrap();
        assert_eq!(backend.get_call_history(), vec!["initialize", "infer"]);
    }

    #[test]
    fn test_mock_rejects_wrong_shape() {
        let mut backend = MockBackend::with_size(64);
        backend.initialize(&RemovalConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 32, 32))).is_err());
    }

    #[test]
    fn test_mock_failure_modes() {
        let mut backend = MockBackend::new_failing_init();
        assert!(backend.initialize(&RemovalConfig::default()).is_err());

        let mut backend = MockBackend::new_failing_inference();
        backend.initialize(&RemovalConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 320, 320))).is_err());
    }
}
