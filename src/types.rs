//! Core types for background removal operations

use crate::error::{BgRemovalError, Result};
use crate::services::ImageIOService;
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView, GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// The processed image with background removed (RGBA)
    pub image: DynamicImage,

    /// The segmentation mask used for removal, at the original size
    pub mask: SegmentationMask,

    /// Original image dimensions
    pub original_dimensions: (u32, u32),

    /// Processing metadata
    pub metadata: ProcessingMetadata,
}

impl RemovalResult {
    /// Create a new removal result
    #[must_use]
    pub fn new(
        image: DynamicImage,
        mask: SegmentationMask,
        original_dimensions: (u32, u32),
        metadata: ProcessingMetadata,
    ) -> Self {
        Self {
            image,
            mask,
            original_dimensions,
            metadata,
        }
    }

    /// Save the result as PNG with alpha channel
    ///
    /// The file is replaced atomically; on failure any previous file at
    /// `path` is left untouched.
    ///
    /// # Errors
    /// - PNG encoding failures
    /// - Destination directory missing or not writable
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ImageIOService::save_png(&self.image, path)
    }

    /// Save as PNG and record the encoding time in the metadata
    ///
    /// # Errors
    /// - Same as [`RemovalResult::save_png`]
    pub fn save_png_timed<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let encode_start = instant::Instant::now();
        self.save_png(path)?;
        let encode_ms = encode_start.elapsed().as_millis() as u64;
        self.metadata.timings.image_encode_ms = Some(encode_ms);
        self.metadata.timings.total_ms += encode_ms;
        Ok(())
    }

    /// Encode the result as PNG bytes
    ///
    /// # Errors
    /// - PNG encoding failures
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.image.write_to(&mut cursor, image::ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Get image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Get detailed timing breakdown
    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.metadata.timings
    }

    /// Get timing summary for display
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.metadata.timings;
        let mut summary = format!(
            "Total: {}ms | Decode: {}ms | Preprocess: {}ms | Inference: {}ms | Postprocess: {}ms",
            t.total_ms, t.image_decode_ms, t.preprocessing_ms, t.inference_ms, t.postprocessing_ms
        );

        if t.model_load_ms > 0 {
            summary.push_str(&format!(" | Model load: {}ms", t.model_load_ms));
        }
        if let Some(encode_ms) = t.image_encode_ms {
            summary.push_str(&format!(" | Encode: {}ms", encode_ms));
        }

        summary
    }
}

/// Grayscale segmentation mask, 255 = foreground
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255), row-major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a new segmentation mask
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.as_raw().clone(), (width, height))
    }

    /// Convert mask to a grayscale image
    ///
    /// # Errors
    /// - Data length does not match the dimensions
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(width, height, self.data.clone()).ok_or_else(
            || {
                BgRemovalError::processing(format!(
                    "Mask data length {} does not match {}x{}",
                    self.data.len(),
                    width,
                    height
                ))
            },
        )
    }

    /// Resize the mask with Lanczos3 filtering
    ///
    /// # Errors
    /// - Data length does not match the dimensions
    pub fn resize(&self, new_width: u32, new_height: u32) -> Result<SegmentationMask> {
        if self.dimensions == (new_width, new_height) {
            return Ok(self.clone());
        }

        let current_image = self.to_image()?;
        let resized = image::imageops::resize(
            &current_image,
            new_width,
            new_height,
            image::imageops::FilterType::Lanczos3,
        );

        Ok(SegmentationMask::from_image(&resized))
    }

    /// Binarise the mask: values above `threshold` become 255, others 0
    #[must_use]
    pub fn threshold(&self, threshold: u8) -> SegmentationMask {
        let data = self
            .data
            .iter()
            .map(|&value| if value > threshold { 255 } else { 0 })
            .collect();
        SegmentationMask::new(data, self.dimensions)
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let background_pixels = total_pixels - foreground_pixels;
        let ratio = |count: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                count as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: ratio(foreground_pixels),
            background_ratio: ratio(background_pixels),
        }
    }
}

/// Statistics about a segmentation mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// Timing breakdown for background removal processing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading time (first call only)
    pub model_load_ms: u64,

    /// Image loading and decoding from file
    pub image_decode_ms: u64,

    /// Resize, normalize and tensor conversion
    pub preprocessing_ms: u64,

    /// Network execution
    pub inference_ms: u64,

    /// Mask generation and compositing
    pub postprocessing_ms: u64,

    /// Final image encoding (if saved)
    pub image_encode_ms: Option<u64>,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Share of the total spent in inference
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }
}

/// Metadata about the processing operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Detailed timing breakdown
    pub timings: ProcessingTimings,

    /// Model used for inference
    pub model_name: String,

    /// Model precision used
    pub model_precision: String,

    /// When processing finished
    pub processed_at: DateTime<Utc>,

    /// Share of the image classified as foreground
    pub foreground_ratio: f32,
}

impl ProcessingMetadata {
    /// Create new processing metadata
    #[must_use]
    pub fn new(model_name: String) -> Self {
        Self {
            timings: ProcessingTimings::default(),
            model_name,
            model_precision: "fp32".to_string(),
            processed_at: Utc::now(),
            foreground_ratio: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mask_statistics() {
        let mask = SegmentationMask::new(vec![255, 200, 0, 100], (2, 2));

        let stats = mask.statistics();
        assert_eq!(stats.total_pixels, 4);
        assert_eq!(stats.foreground_pixels, 2);
        assert_eq!(stats.background_pixels, 2);
        assert!((stats.foreground_ratio - 0.5).abs() < f32::EPSILON);

        let empty = SegmentationMask::new(Vec::new(), (0, 0)).statistics();
        assert_eq!(empty.foreground_ratio, 0.0);
    }

    #[test]
    fn test_mask_threshold() {
        let mask = SegmentationMask::new(vec![0, 127, 128, 255], (4, 1));
        assert_eq!(mask.threshold(127).data, vec![0, 0, 255, 255]);
        assert_eq!(mask.threshold(0).data, vec![0, 255, 255, 255]);
    }

    #[test]
    fn test_mask_resize_keeps_uniform_values() {
        let mask = SegmentationMask::new(vec![255; 16], (4, 4));
        let resized = mask.resize(7, 3).unwrap();
        assert_eq!(resized.dimensions, (7, 3));
        assert!(resized.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_mask_to_image_checks_length() {
        let mask = SegmentationMask::new(vec![1, 2, 3], (2, 2));
        assert!(mask.to_image().is_err());

        let mask = SegmentationMask::new(vec![1, 2, 3, 4], (2, 2));
        let image = mask.to_image().unwrap();
        assert_eq!(SegmentationMask::from_image(&image), mask);
    }

    #[test]
    fn test_result_png_output() {
        let image = DynamicImage::new_rgba8(5, 3);
        let mask = SegmentationMask::new(vec![0; 15], (5, 3));
        let mut result =
            RemovalResult::new(image, mask, (5, 3), ProcessingMetadata::new("u2net".into()));

        let bytes = result.to_png_bytes().unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.png");
        result.save_png_timed(&path).unwrap();
        assert!(result.timings().image_encode_ms.is_some());
        assert!(result.timing_summary().contains("Encode"));
        assert_eq!(image::open(&path).unwrap().dimensions(), (5, 3));
    }

    #[test]
    fn test_metadata_serializes() {
        let metadata = ProcessingMetadata::new("u2net".to_string());
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["model_name"], "u2net");
        assert!(json["processed_at"].is_string());
    }
}
