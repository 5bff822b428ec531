#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use shape_tracker::{Frame, Millis};

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// A white 61x61 plus sign with 15 px arms on black, top-left at `(left, top)`.
pub fn plus_frame(left: u32, top: u32, timestamp: Millis) -> Frame {
    let image = RgbaImage::from_fn(120, 120, |x, y| {
        let (lx, ly) = (x as i64 - left as i64, y as i64 - top as i64);
        let horizontal = (0..61).contains(&lx) && (23..38).contains(&ly);
        let vertical = (23..38).contains(&lx) && (0..61).contains(&ly);
        if horizontal || vertical { WHITE } else { BLACK }
    });
    Frame::from_rgba_image(&image, timestamp)
}

/// Six frames 33 ms apart with a few pixels of jitter around (30, 30).
pub fn jittered_plus_sequence() -> Vec<Frame> {
    let offsets = [(30, 30), (32, 29), (29, 31), (31, 32), (30, 28), (28, 30)];
    offsets
        .iter()
        .enumerate()
        .map(|(i, &(left, top))| plus_frame(left, top, i as Millis * 33))
        .collect()
}

pub fn solid_square_frame(timestamp: Millis) -> Frame {
    let image = RgbaImage::from_fn(100, 100, |x, y| {
        if (10..40).contains(&x) && (10..40).contains(&y) { WHITE } else { BLACK }
    });
    Frame::from_rgba_image(&image, timestamp)
}
