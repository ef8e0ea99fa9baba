//! Image encoding for hosted backends
//!
//! - MIME type detection from the file's magic bytes
//! - Base64 encoding
//! - Data URL construction

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;
use vlbench_kernel::{GenerationError, ImageRef};

/// Used when the bytes are not a recognised image format
pub const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// Base64-encoded image with its MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    /// Encode raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            mime_type: detect_mime_type(bytes).to_string(),
            data: STANDARD.encode(bytes),
        }
    }

    /// `data:<mime-type>;base64,<data>`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// MIME type of an image, falling back to JPEG for unknown content
pub fn detect_mime_type(bytes: &[u8]) -> &'static str {
    infer::get(bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(FALLBACK_MIME_TYPE)
}

/// Read and encode the image a question refers to
pub async fn encode_image(image: &ImageRef) -> Result<EncodedImage, GenerationError> {
    let bytes = image.read().await?;
    Ok(EncodedImage::from_bytes(&bytes))
}

/// Blocking variant for script host calls
pub fn encode_file(path: &Path) -> std::io::Result<EncodedImage> {
    let bytes = std::fs::read(path)?;
    Ok(EncodedImage::from_bytes(&bytes))
}
