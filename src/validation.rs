//! Image validation utilities.
//!
//! Used by the unit tests and by the hardware integration tests to check
//! that a capture produced a well-formed image.

use crate::demosaic::DecodedImage;

/// JPEG start-of-image marker.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Why an image failed validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Byte stream does not start with SOI.
    #[error("missing JPEG start-of-image marker")]
    MissingSoi,
    /// Byte stream does not end with EOI.
    #[error("missing JPEG end-of-image marker")]
    MissingEoi,
    /// Dimensions differ from what was expected.
    #[error("image is {actual:?}, expected {expected:?}")]
    Dimensions {
        /// Expected (width, height).
        expected: (u32, u32),
        /// Actual (width, height).
        actual: (u32, u32),
    },
    /// A sampled pixel is outside tolerance.
    #[error("pixel ({x}, {y}) is RGB{actual:?}, expected RGB{expected:?}")]
    Colour {
        /// Column.
        x: u32,
        /// Row.
        y: u32,
        /// Expected colour.
        expected: (u8, u8, u8),
        /// Sampled colour.
        actual: (u8, u8, u8),
    },
}

/// Validates that `bytes` is framed as a JPEG stream.
///
/// # Errors
///
/// Returns an error if the SOI or EOI marker is missing.
pub fn validate_jpeg(bytes: &[u8]) -> Result<(), ValidationError> {
    if !bytes.starts_with(&JPEG_SOI) {
        return Err(ValidationError::MissingSoi);
    }
    if !bytes.ends_with(&JPEG_EOI) {
        return Err(ValidationError::MissingEoi);
    }
    Ok(())
}

/// Validates the dimensions and buffer size of a decoded image.
///
/// # Errors
///
/// Returns `Dimensions` if either dimension or the byte length is off.
pub fn validate_dimensions(
    image: &DecodedImage,
    width: u32,
    height: u32,
) -> Result<(), ValidationError> {
    let expected_len = width as usize * height as usize * 3;
    if image.width() != width || image.height() != height || image.as_bytes().len() != expected_len
    {
        return Err(ValidationError::Dimensions {
            expected: (width, height),
            actual: (image.width(), image.height()),
        });
    }
    Ok(())
}

/// Validates that an image is a single colour.
///
/// Samples a 3x3 grid of points away from the edges.
///
/// # Errors
///
/// Returns `Colour` for the first sample outside `tolerance`.
pub fn validate_solid_colour(
    image: &DecodedImage,
    expected: (u8, u8, u8),
    tolerance: u8,
) -> Result<(), ValidationError> {
    for row in 1..=3 {
        for col in 1..=3 {
            let x = image.width() * col / 4;
            let y = image.height() * row / 4;
            let actual = image.pixel(x, y).unwrap_or_default();

            if !colors_match(actual, expected, tolerance) {
                return Err(ValidationError::Colour {
                    x,
                    y,
                    expected,
                    actual,
                });
            }
        }
    }
    Ok(())
}

/// Whether every channel of `actual` is within `tolerance` of `expected`.
#[must_use]
pub const fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u8) -> bool {
    actual.0.abs_diff(expected.0) <= tolerance
        && actual.1.abs_diff(expected.1) <= tolerance
        && actual.2.abs_diff(expected.2) <= tolerance
}
