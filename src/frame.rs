use base64::Engine;
use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid frame data format.")]
    InvalidFormat,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),
}

/// Decode a `data:image/...;base64,<payload>` URL into an RGB image.
pub fn decode_data_url(data: &str) -> Result<DynamicImage, FrameError> {
    let payload = data.split(',').nth(1).ok_or(FrameError::InvalidFormat)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
    let img = image::load_from_memory(&bytes)?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}
