//! Shared helpers for integration tests
//!
//! `DiscBackend` stands in for a real segmentation network so the pipeline
//! can run without model files.

#![allow(dead_code)]

use image::{DynamicImage, ImageBuffer, Rgba};
use logo_bgremove::{
    BackgroundRemovalProcessor, BgRemovalError, InferenceBackend, ModelInfo, PreprocessingConfig,
    RemovalConfig, Result,
};
use ndarray::Array4;
use std::path::Path;
use std::time::Duration;

/// Network input size used by the mock, kept small for speed
pub const MOCK_SIZE: usize = 64;

/// Backend whose saliency map is a disc in the middle of the frame
#[derive(Debug, Default)]
pub struct DiscBackend {
    initialized: bool,
}

impl InferenceBackend for DiscBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        self.initialized = true;
        Ok(None)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgRemovalError::inference("not initialized"));
        }
        let (_, _, height, width) = input.dim();
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let radius = width.min(height) as f32 / 3.0;

        Ok(Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| {
            let distance = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            if distance < radius {
                3.0
            } else {
                -3.0
            }
        }))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, MOCK_SIZE, MOCK_SIZE)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        (1, 1, MOCK_SIZE, MOCK_SIZE)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(PreprocessingConfig {
            target_size: [MOCK_SIZE as u32, MOCK_SIZE as u32],
            ..PreprocessingConfig::default()
        })
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "disc".to_string(),
            precision: "fp32".to_string(),
            size_bytes: 0,
            input_shape: self.input_shape(),
            output_shape: self.output_shape(),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Processor backed by [`DiscBackend`]
pub fn disc_processor() -> BackgroundRemovalProcessor {
    BackgroundRemovalProcessor::with_backend(
        RemovalConfig::default(),
        Box::new(DiscBackend::default()),
    )
    .unwrap()
}

/// Opaque logo-like image: white background with a coloured square
pub fn logo_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(ImageBuffer::from_fn(width, height, |x, y| {
        let inside = x > width / 4 && x < width * 3 / 4 && y > height / 4 && y < height * 3 / 4;
        if inside {
            Rgba([20, 60, 160, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    }))
}

/// Write `image` as PNG to `path`
pub fn write_png(image: &DynamicImage, path: &Path) {
    image.save_with_format(path, image::ImageFormat::Png).unwrap();
}
