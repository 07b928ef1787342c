//! Background removal processor
//!
//! `BackgroundRemovalProcessor` owns the whole pipeline: model resolution,
//! backend initialization, preprocessing, inference, mask generation and the
//! final cutout. The library entry points and the command-line tool both go
//! through it.

use crate::{
    cache::ModelCache,
    config::RemovalConfig,
    download::ensure_model_available,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::{ModelManager, ModelSource},
    services::{ImageIOService, ProcessingStage, ProgressTracker},
    types::{ProcessingMetadata, ProcessingTimings, RemovalResult, SegmentationMask},
    utils::ImagePreprocessor,
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::Instant;
use log::{debug, info};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug as trace_debug, info as trace_info, instrument, span, Level};

/// Backend type enumeration for runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    ///
    /// Returns `BgRemovalError` for:
    /// - Backend types not compiled into this build
    /// - Backend construction failures
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Backend factory for the backends enabled by cargo features
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl DefaultBackendFactory {
    #[cfg(feature = "onnx")]
    fn create_onnx(model_manager: ModelManager) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
            model_manager,
        )))
    }

    #[cfg(not(feature = "onnx"))]
    fn create_onnx(_model_manager: ModelManager) -> Result<Box<dyn InferenceBackend>> {
        Err(BgRemovalError::invalid_config(
            "ONNX backend not available in this build. Enable the `onnx` feature.",
        ))
    }

    #[cfg(feature = "tract")]
    fn create_tract(model_manager: ModelManager) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(crate::backends::TractBackend::with_model_manager(
            model_manager,
        )))
    }

    #[cfg(not(feature = "tract"))]
    fn create_tract(_model_manager: ModelManager) -> Result<Box<dyn InferenceBackend>> {
        Err(BgRemovalError::invalid_config(
            "Tract backend not available in this build. Enable the `tract` feature.",
        ))
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            BackendType::Onnx => Self::create_onnx(model_manager),
            BackendType::Tract => Self::create_tract(model_manager),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// Background removal processor
///
/// Holds one initialized backend and reuses it for every image it processes.
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn InferenceBackend>>,
    initialized: bool,
    model_load_ms: u64,
    progress_tracker: Option<ProgressTracker>,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("initialized", &self.initialized)
            .field("has_backend", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor using the backends compiled into this build
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: RemovalConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a processor with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(
        config: RemovalConfig,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend_factory,
            backend: None,
            initialized: false,
            model_load_ms: 0,
            progress_tracker: None,
        })
    }

    /// Create a processor around an already constructed backend
    ///
    /// Model resolution is skipped: the backend is expected to know its model.
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_backend(config: RemovalConfig, backend: Box<dyn InferenceBackend>) -> Result<Self> {
        let mut processor = Self::new(config)?;
        processor.backend = Some(backend);
        Ok(processor)
    }

    /// Attach a progress tracker
    pub fn set_progress_tracker(&mut self, tracker: ProgressTracker) {
        self.progress_tracker = Some(tracker);
    }

    /// Get the processor configuration
    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Whether the backend has been initialized
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn report_stage(&mut self, stage: ProcessingStage) {
        if let Some(ref mut tracker) = self.progress_tracker {
            tracker.report_stage(stage);
        }
    }

    fn report_error(&self, error: &BgRemovalError) {
        if let Some(ref tracker) = self.progress_tracker {
            tracker.report_error(&error.to_string());
        }
    }

    /// Resolve the model and initialize the backend
    ///
    /// Does not download anything; use [`BackgroundRemovalProcessor::prepare`]
    /// when the model may be missing from the cache.
    ///
    /// # Errors
    /// - Model not found or not cached
    /// - Backend creation or initialization failures
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        if self.backend.is_none() {
            let model_manager = ModelManager::from_spec(&self.config.model_spec)?;
            let backend = self
                .backend_factory
                .create_backend(self.config.backend_type, model_manager)?;
            self.backend = Some(backend);
        }

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("Backend missing after creation"))?;

        let load_time = backend.initialize(&self.config)?;
        self.model_load_ms = load_time.map_or(0, |d| d.as_millis() as u64);
        self.initialized = true;

        info!(
            "Initialized {} backend with model {}",
            self.config.backend_type,
            self.config.model_spec.source.display_name()
        );
        Ok(())
    }

    /// Make sure the model is available, then initialize the backend
    ///
    /// Downloads a missing registry model when `auto_download` is enabled.
    ///
    /// # Errors
    /// - Model unavailable and download disabled or failed
    /// - Backend creation or initialization failures
    pub async fn prepare(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        self.report_stage(ProcessingStage::Initialization);

        if self.backend.is_none() {
            if let ModelSource::Downloaded(model_id) = &self.config.model_spec.source {
                if !ModelCache::new()?.is_model_cached(model_id) {
                    self.report_stage(ProcessingStage::ModelDownload);
                }
            }
            ensure_model_available(&self.config.model_spec, self.config.auto_download).await?;
        }

        self.initialize()
    }

    /// Remove the background from an in-memory image
    ///
    /// The result has the same dimensions as `image`.
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Preprocessing or inference failures
    #[instrument(skip(self, image), fields(
        backend = %self.config.backend_type,
        model = %self.config.model_spec.source.display_name(),
        dimensions = %format!("{}x{}", image.width(), image.height())
    ))]
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        let result = self.process_image_inner(image);
        if let Err(ref e) = result {
            self.report_error(e);
        }
        result
    }

    fn process_image_inner(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        if !self.initialized {
            self.initialize()?;
        }

        let total_start = Instant::now();
        let original_dimensions = image.dimensions();
        let mut timings = ProcessingTimings {
            model_load_ms: self.model_load_ms,
            ..ProcessingTimings::default()
        };

        let input_tensor = self.preprocess_image_for_inference(image, &mut timings)?;
        let output_tensor = self.perform_inference(&input_tensor, &mut timings)?;
        let (result_image, mask) =
            self.generate_mask_and_remove_background(image, &output_tensor, &mut timings)?;

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        self.finalize_processing_result(result_image, mask, original_dimensions, timings)
    }

    fn preprocess_image_for_inference(
        &mut self,
        image: &DynamicImage,
        timings: &mut ProcessingTimings,
    ) -> Result<Array4<f32>> {
        self.report_stage(ProcessingStage::Preprocessing);
        let _span = span!(
            Level::DEBUG,
            "preprocessing",
            width = image.width(),
            height = image.height()
        )
        .entered();

        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| BgRemovalError::internal("Backend not initialized"))?;

        let preprocess_start = Instant::now();
        let preprocessing_config = backend.get_preprocessing_config()?;
        let tensor = ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?;
        timings.preprocessing_ms = preprocess_start.elapsed().as_millis() as u64;

        trace_debug!(
            shape = ?tensor.shape(),
            duration_ms = timings.preprocessing_ms,
            "Preprocessing completed"
        );
        Ok(tensor)
    }

    fn perform_inference(
        &mut self,
        input_tensor: &Array4<f32>,
        timings: &mut ProcessingTimings,
    ) -> Result<Array4<f32>> {
        self.report_stage(ProcessingStage::Inference);
        let _span = span!(Level::DEBUG, "inference").entered();

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("Backend not initialized"))?;

        let inference_start = Instant::now();
        let output = backend.infer(input_tensor)?;
        timings.inference_ms = inference_start.elapsed().as_millis() as u64;

        trace_info!(
            output_shape = ?output.shape(),
            duration_ms = timings.inference_ms,
            "Inference completed"
        );
        Ok(output)
    }

    fn generate_mask_and_remove_background(
        &mut self,
        image: &DynamicImage,
        output_tensor: &Array4<f32>,
        timings: &mut ProcessingTimings,
    ) -> Result<(RgbaImage, SegmentationMask)> {
        let postprocess_start = Instant::now();

        self.report_stage(ProcessingStage::MaskGeneration);
        let mask =
            Self::tensor_to_mask(output_tensor, image.dimensions(), self.config.mask_threshold)?;

        self.report_stage(ProcessingStage::BackgroundRemoval);
        let result_image = Self::apply_background_removal(image, &mask)?;

        timings.postprocessing_ms = postprocess_start.elapsed().as_millis() as u64;
        Ok((result_image, mask))
    }

    fn finalize_processing_result(
        &mut self,
        result_image: RgbaImage,
        mask: SegmentationMask,
        original_dimensions: (u32, u32),
        timings: ProcessingTimings,
    ) -> Result<RemovalResult> {
        let model_info = self
            .backend
            .as_ref()
            .ok_or_else(|| BgRemovalError::internal("Backend not initialized"))?
            .get_model_info()?;

        let mut metadata = ProcessingMetadata::new(model_info.name);
        metadata.model_precision = model_info.precision;
        metadata.foreground_ratio = mask.statistics().foreground_ratio;
        metadata.timings = timings;

        debug!(
            "Processed {}x{} image in {}ms ({:.1}% foreground)",
            original_dimensions.0,
            original_dimensions.1,
            metadata.timings.total_ms,
            metadata.foreground_ratio * 100.0
        );

        Ok(RemovalResult::new(
            DynamicImage::ImageRgba8(result_image),
            mask,
            original_dimensions,
            metadata,
        ))
    }

    /// Remove the background from encoded image bytes
    ///
    /// # Errors
    /// - Undecodable image data
    /// - Same as [`BackgroundRemovalProcessor::process_image`]
    pub fn process_bytes(&mut self, data: &[u8]) -> Result<RemovalResult> {
        let decode_start = Instant::now();
        let image = image::load_from_memory(data)?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        let mut result = self.process_image(&image)?;
        result.metadata.timings.image_decode_ms = decode_ms;
        result.metadata.timings.total_ms += decode_ms;
        Ok(result)
    }

    /// Remove the background from an image file
    ///
    /// # Errors
    /// - Input missing or undecodable
    /// - Same as [`BackgroundRemovalProcessor::process_image`]
    pub fn process_file<P: AsRef<Path>>(&mut self, input_path: P) -> Result<RemovalResult> {
        let (image, decode_ms) = self.load_input(input_path.as_ref())?;
        let mut result = self.process_image(&image)?;
        result.metadata.timings.image_decode_ms = decode_ms;
        result.metadata.timings.total_ms += decode_ms;
        Ok(result)
    }

    /// Full file-to-file run: load, prepare the model, process, save as PNG
    ///
    /// The input is loaded before the model is touched so a missing input
    /// fails without any download. The output is replaced atomically and is
    /// not written at all when an earlier step fails.
    ///
    /// # Errors
    /// - Input missing or undecodable
    /// - Model unavailable, backend or inference failures
    /// - Output directory missing or not writable
    pub async fn process_file_to_png<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        input_path: P,
        output_path: Q,
    ) -> Result<RemovalResult> {
        let (image, decode_ms) = self.load_input(input_path.as_ref())?;

        if let Err(e) = self.prepare().await {
            self.report_error(&e);
            return Err(e);
        }

        let mut result = self.process_image(&image)?;
        result.metadata.timings.image_decode_ms = decode_ms;
        result.metadata.timings.total_ms += decode_ms;

        self.report_stage(ProcessingStage::FileSaving);
        if let Err(e) = result.save_png_timed(output_path.as_ref()) {
            self.report_error(&e);
            return Err(e);
        }

        self.report_stage(ProcessingStage::Completed);
        if let Some(ref tracker) = self.progress_tracker {
            tracker.report_completion(result.metadata.timings.clone());
        }

        info!("Saved transparent image to {}", output_path.as_ref().display());
        Ok(result)
    }

    fn load_input(&mut self, input_path: &Path) -> Result<(DynamicImage, u64)> {
        let decode_start = Instant::now();
        let image = match ImageIOService::load_image(input_path) {
            Ok(image) => image,
            Err(e) => {
                self.report_error(&e);
                return Err(e);
            },
        };
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        if let Some(ref mut tracker) = self.progress_tracker {
            tracker.report_stage_with_dimensions(ProcessingStage::ImageLoading, image.dimensions());
        }
        Ok((image, decode_ms))
    }

    /// Convert the network output to a mask at the original image size
    ///
    /// Channel 0 of the first batch item is min-max normalized to 0..1,
    /// scaled to 0..255 with truncation and resized with Lanczos3. A constant
    /// map yields an all-zero mask. With `threshold` set, values above it
    /// become 255 and the rest 0.
    ///
    /// # Errors
    /// - Tensor without a batch or channel entry
    pub fn tensor_to_mask(
        tensor: &Array4<f32>,
        original_dimensions: (u32, u32),
        threshold: Option<u8>,
    ) -> Result<SegmentationMask> {
        let shape = tensor.shape();
        if shape[0] == 0 || shape[1] == 0 || shape[2] == 0 || shape[3] == 0 {
            return Err(BgRemovalError::processing(format!(
                "Model output has an empty dimension: {:?}",
                shape
            )));
        }

        let saliency = tensor.slice(ndarray::s![0, 0, .., ..]);
        let (min, max) = saliency
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = max - min;

        let (mask_height, mask_width) = (shape[2], shape[3]);
        let data: Vec<u8> = if range > 0.0 && range.is_finite() {
            saliency
                .iter()
                .map(|&v| (((v - min) / range) * 255.0) as u8)
                .collect()
        } else {
            vec![0; mask_height * mask_width]
        };

        let mask = SegmentationMask::new(data, (mask_width as u32, mask_height as u32))
            .resize(original_dimensions.0, original_dimensions.1)?;

        Ok(match threshold {
            Some(t) => mask.threshold(t),
            None => mask,
        })
    }

    /// Composite the image over a fully transparent background using the mask
    ///
    /// Every channel, alpha included, is scaled by `mask / 255` with rounding,
    /// so fully masked pixels become `(0, 0, 0, 0)`.
    ///
    /// # Errors
    /// - Mask dimensions differ from the image
    pub fn apply_background_removal(
        image: &DynamicImage,
        mask: &SegmentationMask,
    ) -> Result<RgbaImage> {
        if mask.dimensions != image.dimensions() {
            return Err(BgRemovalError::processing(format!(
                "Mask is {}x{} but image is {}x{}",
                mask.dimensions.0,
                mask.dimensions.1,
                image.width(),
                image.height()
            )));
        }

        let mut rgba_image = image.to_rgba8();
        for (pixel, &m) in rgba_image.pixels_mut().zip(mask.data.iter()) {
            for channel in &mut pixel.0 {
                *channel = mul_div_255(*channel, m);
            }
        }
        Ok(rgba_image)
    }
}

/// `round(a * b / 255)` in integer arithmetic
#[inline]
fn mul_div_255(a: u8, b: u8) -> u8 {
    let tmp = u32::from(a) * u32::from(b) + 128;
    (((tmp >> 8) + tmp) >> 8) as u8
}
