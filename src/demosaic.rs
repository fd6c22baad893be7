//! Bilinear demosaicing of 8-bit Bayer frames to interleaved RGB24.
//!
//! Missing channels are the rounded mean of the nearest same-channel
//! neighbours. Edges reflect about the border pixel (`-1 -> 1`,
//! `n -> n - 2`), which keeps the Bayer parity so every neighbour read is
//! of the channel being interpolated.

use crate::traits::FourCC;

/// 2x2 tiling of a Bayer sensor, named by its top-left row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BayerLayout {
    /// `B G / G R`
    #[default]
    Bggr,
    /// `G B / R G`
    Gbrg,
    /// `G R / B G`
    Grbg,
    /// `R G / G B`
    Rggb,
}

impl BayerLayout {
    /// Layout of an 8-bit Bayer pixel format.
    #[must_use]
    pub const fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match fourcc.0 {
            [b'B', b'A', b'8', b'1'] => Some(Self::Bggr),
            [b'G', b'B', b'R', b'G'] => Some(Self::Gbrg),
            [b'G', b'R', b'B', b'G'] => Some(Self::Grbg),
            [b'R', b'G', b'G', b'B'] => Some(Self::Rggb),
            _ => None,
        }
    }

    /// Position of the blue sample within the 2x2 tile.
    const fn blue_origin(self) -> (usize, usize) {
        match self {
            Self::Bggr => (0, 0),
            Self::Gbrg => (1, 0),
            Self::Grbg => (0, 1),
            Self::Rggb => (1, 1),
        }
    }
}

/// An owned RGB24 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl DecodedImage {
    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Interleaved RGB bytes, `width * height * 3` long.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the RGB bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at (`x`, `y`).
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        match self.data.get(offset..offset + 3) {
            Some(&[r, g, b]) => Some((r, g, b)),
            _ => None,
        }
    }

    /// Convert into an `image` buffer for saving in other formats.
    #[must_use]
    pub fn into_rgb_image(self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data)
    }
}

/// Demosaic one raw frame.
///
/// `raw` must hold exactly `width * height` samples and both dimensions
/// must be at least 2; anything else is a caller bug.
#[must_use]
#[allow(clippy::indexing_slicing, clippy::cast_possible_truncation)]
pub fn demosaic(raw: &[u8], width: u32, height: u32, layout: BayerLayout) -> DecodedImage {
    let w = width as usize;
    let h = height as usize;
    assert!(w >= 2 && h >= 2, "bayer frame must be at least 2x2, got {w}x{h}");
    assert_eq!(raw.len(), w * h, "raw frame length does not match {w}x{h}");

    let (bx, by) = layout.blue_origin();
    let mut data = vec![0u8; w * h * 3];

    let at = |x: usize, y: usize| u16::from(raw[y * w + x]);

    for y in 0..h {
        let up = if y == 0 { 1 } else { y - 1 };
        let down = if y + 1 == h { h - 2 } else { y + 1 };

        for x in 0..w {
            let left = if x == 0 { 1 } else { x - 1 };
            let right = if x + 1 == w { w - 2 } else { x + 1 };

            let here = at(x, y);
            let horizontal = || avg2(at(left, y), at(right, y));
            let vertical = || avg2(at(x, up), at(x, down));
            let cross = || avg4(at(left, y), at(right, y), at(x, up), at(x, down));
            let diagonal = || avg4(at(left, up), at(right, up), at(left, down), at(right, down));

            let (r, g, b) = match ((y + by) % 2, (x + bx) % 2) {
                (0, 0) => (diagonal(), cross(), here),
                (0, _) => (vertical(), here, horizontal()),
                (_, 0) => (horizontal(), here, vertical()),
                _ => (here, cross(), diagonal()),
            };

            let offset = (y * w + x) * 3;
            data[offset] = r as u8;
            data[offset + 1] = g as u8;
            data[offset + 2] = b as u8;
        }
    }

    DecodedImage {
        width,
        height,
        data,
    }
}

const fn avg2(a: u16, b: u16) -> u16 {
    (a + b + 1) / 2
}

const fn avg4(a: u16, b: u16, c: u16, d: u16) -> u16 {
    (a + b + c + d + 2) / 4
}
