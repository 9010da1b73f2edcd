//! Image normalization for the glyph classifiers.
//!
//! Every input, whatever its size or colour mode, leaves this crate as a
//! `[1, H, W, 1]` `f32` tensor with values in `[0.0, 1.0]`, dark background
//! and light strokes.

pub mod config;
pub mod cpu;
pub mod decode;
pub mod errors;

use ndarray::Array4;

pub use config::{DEFAULT_INPUT_SIZE, INVERSION_THRESHOLD, PreprocessConfig};
pub use cpu::CpuPreProcessor;
pub use decode::{decode_base64, decode_bytes, strip_data_url};
pub use errors::{PreprocessError, PreprocessStep};

/// Batch of one grayscale image laid out as `[batch, height, width, channel]`.
pub type PreprocessedTensor = Array4<f32>;
