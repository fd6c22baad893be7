//! Baseline JPEG compression of decoded images.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tracing::debug;

use crate::demosaic::DecodedImage;
use crate::traits::{CameraError, Result};

/// A compressed image ready to hand to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data: Vec<u8>,
}

impl EncodedImage {
    /// Compressed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the compressed bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Compressed size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no bytes were produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for EncodedImage {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Compress `image` as a baseline JPEG at `quality` (1..=100).
pub fn encode(image: &DecodedImage, quality: u8) -> Result<EncodedImage> {
    let mut data = Vec::new();
    // Photographs compress to well under a tenth of their RGB size.
    data.try_reserve(image.as_bytes().len() / 8)
        .map_err(|e| CameraError::Encoding(e.to_string()))?;

    JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100))
        .encode(
            image.as_bytes(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| CameraError::Encoding(e.to_string()))?;

    debug!(
        width = image.width(),
        height = image.height(),
        quality,
        bytes = data.len(),
        "frame encoded"
    );
    Ok(EncodedImage { data })
}
