use crate::errors::PreprocessError;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::DynamicImage;

/// Decodes an encoded image (PNG, JPEG, BMP).
///
/// `filename` is only used to give the error some context.
pub fn decode_bytes(bytes: &[u8], filename: Option<&str>) -> Result<DynamicImage, PreprocessError> {
    let image = image::load_from_memory(bytes).map_err(|e| PreprocessError::InvalidImage {
        reason: e.to_string(),
        filename: filename.map(str::to_string),
    })?;

    tracing::debug!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "Decoded image"
    );

    Ok(image)
}

/// Drops a `data:<mime>;base64,` header if there is one.
pub fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data.trim(),
        None => payload.trim(),
    }
}

/// Decodes a canvas submission: base64, optionally wrapped in a data URL.
pub fn decode_base64(payload: &str) -> Result<DynamicImage, PreprocessError> {
    let bytes = STANDARD
        .decode(strip_data_url(payload))
        .map_err(|e| PreprocessError::InvalidImage {
            reason: format!("invalid base64 payload: {e}"),
            filename: None,
        })?;

    decode_bytes(&bytes, None)
}
