// THEORY:
// A `Frame` is what the external frame source hands the engine once per tick:
// raw bytes, their dimensions, the byte layout and the capture time. The engine
// never assumes a stable cadence, so the timestamp travels with the buffer and
// every time-dependent decision downstream (expiry, motion prediction) reads it
// from here instead of from a wall clock.

use crate::core_modules::pixel::pixel::Pixel;
use image::RgbaImage;

/// Milliseconds on the frame source's clock.
pub type Millis = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    pub timestamp: Millis,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>, timestamp: Millis) -> Self {
        Self {
            width,
            height,
            format,
            data,
            timestamp,
        }
    }

    pub fn rgba(width: u32, height: u32, data: Vec<u8>, timestamp: Millis) -> Self {
        Self::new(width, height, PixelFormat::Rgba8, data, timestamp)
    }

    pub fn from_rgba_image(image: &RgbaImage, timestamp: Millis) -> Self {
        Self::rgba(image.width(), image.height(), image.as_raw().clone(), timestamp)
    }

    /// Number of pixels the dimensions claim.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when the buffer holds exactly `width * height` samples and the area is non-zero.
    pub fn is_well_formed(&self) -> bool {
        self.area() > 0 && self.data.len() == self.area() * self.format.channels()
    }

    /// Iterates pixels in row-major order. Yields nothing useful for malformed frames;
    /// callers check `is_well_formed` first.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.data
            .chunks_exact(self.format.channels())
            .filter_map(Pixel::from_channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_length_mismatch() {
        assert!(Frame::rgba(2, 2, vec![0; 16], 0).is_well_formed());
        assert!(!Frame::rgba(2, 2, vec![0; 15], 0).is_well_formed());
        assert!(!Frame::rgba(0, 5, Vec::new(), 0).is_well_formed());
        assert!(Frame::new(2, 1, PixelFormat::Rgb8, vec![0; 6], 0).is_well_formed());
    }
}
