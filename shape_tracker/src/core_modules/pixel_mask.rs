// THEORY:
// The `PixelMask` is the binary image every downstream stage reads: one
// foreground flag per pixel, row-major. Like the pixel container it is "dumb":
// it knows its dimensions and how to index itself, nothing about shapes. A mask
// is produced once per frame and never mutated after the preprocessor returns
// it, which is what lets the extractor and matcher borrow it freely (and what
// lets the parallel pipeline share it behind an `Arc`).

pub mod pixel_mask {
    /// A width x height grid of foreground flags.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct PixelMask {
        width: u32,
        height: u32,
        bits: Vec<bool>,
    }

    impl PixelMask {
        /// An all-background mask of the given size.
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                bits: vec![false; width as usize * height as usize],
            }
        }

        /// The 0x0 mask returned for empty or malformed input.
        pub fn empty() -> Self {
            Self::default()
        }

        pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
            let mut mask = Self::new(width, height);
            for y in 0..height {
                for x in 0..width {
                    if f(x, y) {
                        mask.set(x, y, true);
                    }
                }
            }
            mask
        }

        pub(crate) fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Self {
            debug_assert_eq!(bits.len(), width as usize * height as usize);
            Self { width, height, bits }
        }

        pub fn width(&self) -> u32 {
            self.width
        }

        pub fn height(&self) -> u32 {
            self.height
        }

        pub fn is_empty(&self) -> bool {
            self.bits.is_empty()
        }

        #[inline]
        pub fn index(&self, x: u32, y: u32) -> usize {
            y as usize * self.width as usize + x as usize
        }

        /// Out-of-bounds coordinates read as background.
        #[inline]
        pub fn get(&self, x: u32, y: u32) -> bool {
            x < self.width && y < self.height && self.bits[self.index(x, y)]
        }

        pub fn set(&mut self, x: u32, y: u32, value: bool) {
            if x < self.width && y < self.height {
                let index = self.index(x, y);
                self.bits[index] = value;
            }
        }

        pub fn foreground_count(&self) -> usize {
            self.bits.iter().filter(|bit| **bit).count()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel_mask::PixelMask;

    #[test]
    fn out_of_bounds_reads_background() {
        let mut mask = PixelMask::new(3, 2);
        mask.set(2, 1, true);
        mask.set(5, 5, true);
        assert!(mask.get(2, 1));
        assert!(!mask.get(3, 1));
        assert_eq!(mask.foreground_count(), 1);
        assert!(PixelMask::empty().is_empty());
    }
}
