use crate::config::{DEFAULT_INPUT_SIZE, INVERSION_THRESHOLD, PreprocessConfig};
use crate::decode::{decode_base64, decode_bytes};
use crate::errors::{PreprocessError, PreprocessStep};
use crate::PreprocessedTensor;
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::{DynamicImage, GrayImage, imageops};
use ndarray::{Array2, Axis};

const MAX_PIXEL: f32 = 255.0;

/// Stateless CPU implementation of the preprocessing pipeline.
///
/// Stages run in a fixed order: grayscale, polarity inversion, resize,
/// scale to `[0, 1]`, reshape to `[1, H, W, 1]`. Inversion runs before the
/// resize so the filter never mixes pixels of the wrong polarity.
#[derive(Debug, Clone)]
pub struct CpuPreProcessor {
    /// `(width, height)`
    pub input_size: (u32, u32),
    inversion_threshold: f32,
}

impl CpuPreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            inversion_threshold: INVERSION_THRESHOLD,
        }
    }

    pub fn from_config(config: &PreprocessConfig) -> Self {
        Self {
            input_size: config.input_size,
            inversion_threshold: config.inversion_threshold,
        }
    }

    /// Decodes an uploaded file and preprocesses it with inversion enabled.
    ///
    /// Uploads cannot be assumed to match the training polarity, so they get
    /// the same treatment as canvas drawings.
    pub fn preprocess_upload(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<PreprocessedTensor, PreprocessError> {
        let image = decode_bytes(bytes, Some(filename))?;
        self.preprocess(&image, true)
    }

    /// Decodes a canvas submission (base64 / data URL) and preprocesses it
    /// with inversion enabled.
    pub fn preprocess_canvas(&self, payload: &str) -> Result<PreprocessedTensor, PreprocessError> {
        let image = decode_base64(payload)?;
        self.preprocess(&image, true)
    }

    pub fn preprocess(
        &self,
        image: &DynamicImage,
        invert_if_light_background: bool,
    ) -> Result<PreprocessedTensor, PreprocessError> {
        let _s = span!("preprocess");

        tracing::trace!(
            width = image.width(),
            height = image.height(),
            color = ?image.color(),
            target_width = self.input_size.0,
            target_height = self.input_size.1,
            "Preprocessing image"
        );

        let mut gray = Self::to_grayscale(image)?;

        if invert_if_light_background {
            let mean = corner_mean(&gray).ok_or_else(|| {
                PreprocessError::failed(PreprocessStep::Inversion, "image has no pixels")
            })?;
            let inverted = mean > self.inversion_threshold;
            if inverted {
                imageops::invert(&mut gray);
            }
            tracing::debug!(corner_mean = mean, inverted, "Background polarity check");
        }

        let resized = self.resize(&gray)?;
        let scaled = Self::normalize(&resized)?;

        Self::to_tensor(scaled, self.input_size)
    }

    fn to_grayscale(image: &DynamicImage) -> Result<GrayImage, PreprocessError> {
        let gray = match image {
            DynamicImage::ImageLuma8(gray) => gray.clone(),
            other => other.to_luma8(),
        };

        if gray.width() == 0 || gray.height() == 0 {
            return Err(PreprocessError::failed(
                PreprocessStep::Grayscale,
                format!("empty image ({}x{})", gray.width(), gray.height()),
            ));
        }

        Ok(gray)
    }

    fn resize(&self, gray: &GrayImage) -> Result<Vec<u8>, PreprocessError> {
        let _s = span!("resize");

        let (target_width, target_height) = self.input_size;
        if gray.dimensions() == (target_width, target_height) {
            return Ok(gray.as_raw().clone());
        }

        let src = ImageRef::new(gray.width(), gray.height(), gray.as_raw(), PixelType::U8)
            .map_err(|e| PreprocessError::failed(PreprocessStep::Resize, e))?;

        let mut resized = Image::new(target_width, target_height, PixelType::U8);

        Resizer::new()
            .resize(
                &src,
                &mut resized,
                &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3)),
            )
            .map_err(|e| PreprocessError::failed(PreprocessStep::Resize, e))?;

        Ok(resized.buffer().to_vec())
    }

    fn normalize(pixels: &[u8]) -> Result<Vec<f32>, PreprocessError> {
        if pixels.is_empty() {
            return Err(PreprocessError::failed(
                PreprocessStep::Normalize,
                "no pixels to scale",
            ));
        }
        Ok(pixels.iter().map(|&v| f32::from(v) / MAX_PIXEL).collect())
    }

    fn to_tensor(
        scaled: Vec<f32>,
        (width, height): (u32, u32),
    ) -> Result<PreprocessedTensor, PreprocessError> {
        let plane = Array2::from_shape_vec((height as usize, width as usize), scaled)
            .map_err(|e| PreprocessError::failed(PreprocessStep::Reshape, e))?;

        // [H, W] -> [H, W, 1] -> [1, H, W, 1]
        Ok(plane.insert_axis(Axis(2)).insert_axis(Axis(0)))
    }
}

impl Default for CpuPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

/// Mean of the four corner pixels on the 0-255 scale.
///
/// This is a heuristic: it assumes the glyph does not touch the corners.
/// A stroke through a corner can tip the decision either way.
pub fn corner_mean(gray: &GrayImage) -> Option<f32> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let (right, bottom) = (width - 1, height - 1);
    let sum: f32 = [(0, 0), (right, 0), (0, bottom), (right, bottom)]
        .iter()
        .map(|&(x, y)| f32::from(gray.get_pixel(x, y).0[0]))
        .sum();

    Some(sum / 4.0)
}
