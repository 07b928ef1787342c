//! Image preprocessing for model inference

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Image preprocessing for the segmentation networks
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Turn an image into the network input tensor
    ///
    /// - RGB conversion (alpha is dropped)
    /// - Lanczos3 resize to `target_size`, stretching rather than padding
    /// - scaling by the largest channel value of the resized image
    /// - per-channel mean/std normalization
    /// - `1×3×H×W` layout
    ///
    /// # Errors
    /// - Zero-sized input image or target size
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_width, target_height] = preprocessing_config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(BgRemovalError::processing_stage_error(
                "preprocessing",
                "model target size must be non-zero",
                None,
            ));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::processing_stage_error(
                "preprocessing",
                "image has no pixels",
                Some(&format!("{}x{}", image.width(), image.height())),
            ));
        }

        let rgb_image = image.to_rgb8();
        let resized = image::imageops::resize(
            &rgb_image,
            target_width,
            target_height,
            FilterType::Lanczos3,
        );

        Ok(Self::image_to_tensor(&resized, preprocessing_config))
    }

    /// Convert an already resized image to a normalized NCHW tensor
    fn image_to_tensor(
        image: &RgbImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Array4<f32> {
        let (width, height) = image.dimensions();
        let max_value = image.as_raw().iter().copied().max().unwrap_or(0);
        // An all-black image keeps its zeros instead of dividing by zero
        let scale = if max_value == 0 {
            1.0
        } else {
            f32::from(max_value)
        };

        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, channel, y, x)| {
                let value = image.get_pixel(x as u32, y as u32)[channel];
                (f32::from(value) / scale - mean[channel]) / std[channel]
            },
        )
    }
}
