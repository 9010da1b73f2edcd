/// Target `(width, height)` of the classifier input.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (64, 64);

/// Corner mean (0-255 scale) above which the background is treated as light.
pub const INVERSION_THRESHOLD: f32 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessConfig {
    /// `(width, height)` every image is resized to, aspect ratio ignored.
    pub input_size: (u32, u32),
    pub inversion_threshold: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            inversion_threshold: INVERSION_THRESHOLD,
        }
    }
}
