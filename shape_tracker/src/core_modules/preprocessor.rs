// THEORY:
// The preprocessor is the first stage of the pipeline: a pure function from a
// raw frame to a binary mask. Each pixel is reduced to its unweighted grayscale
// intensity and compared against a contrast threshold.
//
// It has no error path. A zero-area frame, or one whose byte length disagrees
// with its declared dimensions, simply produces the empty mask, and every later
// stage naturally yields nothing for an empty mask.

use crate::core_modules::frame::Frame;
use crate::core_modules::pixel_mask::pixel_mask::PixelMask;

pub mod preprocessor {
    use super::*;

    /// The default contrast threshold on the 0-255 intensity scale.
    pub const DEFAULT_CONTRAST_THRESHOLD: f64 = 80.0;

    /// Binarises `frame`: foreground where intensity is strictly above `threshold`.
    pub fn threshold_frame(frame: &Frame, threshold: f64) -> PixelMask {
        if !frame.is_well_formed() {
            return PixelMask::empty();
        }

        let bits = frame.pixels().map(|pixel| pixel.is_foreground(threshold)).collect();
        PixelMask::from_bits(frame.width, frame.height, bits)
    }
}
