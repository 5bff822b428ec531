// THEORY:
// The `Pixel` module is the smallest unit of the engine: a "dumb" container for
// one RGBA sample plus the single-pixel heuristics the rest of the pipeline
// needs. Nothing here looks at neighbours or at time.
//
// The only heuristic the shape pipeline depends on is `intensity`: the plain,
// unweighted mean of the red, green and blue channels, with no perceptual
// weighting. Alpha never participates in thresholding.
//
// Frames arrive either as RGBA (4 bytes per pixel) or RGB (3 bytes per pixel);
// `Pixel::from_channels` accepts both and reports anything else as `None` so
// that the caller can treat the buffer as malformed.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;
    pub type Intensity = f64;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// Builds a pixel from one RGB or RGBA sample. RGB samples are opaque.
        pub fn from_channels(bytes: &[Byte]) -> Option<Self> {
            match *bytes {
                [red, green, blue] => Some(Pixel::new(red, green, blue, Channel::MAX)),
                [red, green, blue, alpha] => Some(Pixel::new(red, green, blue, alpha)),
                _ => None,
            }
        }

        /// Grayscale intensity as the unweighted mean of R, G and B (0.0..=255.0).
        pub fn intensity(&self) -> Intensity {
            (self.red as Intensity + self.green as Intensity + self.blue as Intensity) / 3.0
        }

        /// A pixel is foreground when its intensity is strictly above `threshold`.
        #[inline]
        pub fn is_foreground(&self, threshold: Intensity) -> bool {
            self.intensity() > threshold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::Pixel;

    #[test]
    fn intensity_is_unweighted_mean() {
        let pixel = Pixel::new(90, 0, 150, 0);
        assert_eq!(pixel.intensity(), 80.0);
        assert!(!pixel.is_foreground(80.0));
        assert!(Pixel::new(91, 0, 150, 0).is_foreground(80.0));
    }

    #[test]
    fn rgb_samples_are_opaque() {
        let pixel = Pixel::from_channels(&[1, 2, 3]).unwrap();
        assert_eq!(pixel, Pixel::new(1, 2, 3, 255));
        assert!(Pixel::from_channels(&[1, 2]).is_none());
    }
}
