//! Inference backend abstraction

use crate::{config::RemovalConfig, error::Result};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// A backend owns a loaded segmentation network. It receives the
/// preprocessed `1×3×H×W` tensor and returns the network's first output,
/// reshaped to NCHW.
pub trait InferenceBackend {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time when a model was actually loaded.
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Model loading or validation errors
    /// - Invalid configuration parameters
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Tensor conversion or processing errors
    /// - Invalid input tensor dimensions
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Get the expected input shape for this backend
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Get the expected output shape for this backend
    fn output_shape(&self) -> (usize, usize, usize, usize);

    /// Get preprocessing configuration for this backend
    ///
    /// # Errors
    /// - Model manager not initialized
    /// - Invalid or missing preprocessing configuration
    fn get_preprocessing_config(&self) -> Result<crate::models::PreprocessingConfig>;

    /// Get model information for this backend
    ///
    /// # Errors
    /// - Model manager not initialized
    /// - Model metadata unavailable or invalid
    fn get_model_info(&self) -> Result<crate::models::ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}
