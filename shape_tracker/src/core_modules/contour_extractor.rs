// THEORY:
// The contour extractor is the spatial grouping stage. It turns the binary mask
// into a list of connected regions ("contours") using plain 8-connected
// component labelling.
//
// Algorithm:
// 1.  **Seeding**: scan interior pixels (a 1-pixel frame border is never used as
//     a seed) in row-major order. Every foreground pixel that is not yet visited
//     starts a new region.
// 2.  **Flood fill**: grow the region with an explicit stack, never recursion,
//     so a frame-sized blob cannot exhaust the call stack. Neighbours are pushed
//     in a fixed order and marked visited at push time, so each pixel enters the
//     stack at most once and the whole pass is O(width * height).
// 3.  **Filtering**: regions with fewer than `min_pixels` pixels are noise and are
//     dropped before anything else looks at them.
// 4.  **Summary**: retained regions are packaged as `Contour`s with their derived
//     geometry.
//
// Like the other per-frame utilities, the extractor is stateless: identical masks
// always produce identical contours in identical order.

use crate::core_modules::contour::{Contour, Point};
use crate::core_modules::pixel_mask::pixel_mask::PixelMask;

pub mod contour_extractor {
    use super::*;

    /// Components smaller than this are discarded by default.
    pub const DEFAULT_MIN_CONTOUR_PIXELS: usize = 20;

    /// Fixed neighbour visit order; part of the determinism contract.
    const NEIGHBOURS: [(i64, i64); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];

    /// Finds every 8-connected foreground region with at least `min_pixels` pixels.
    pub fn find_contours(mask: &PixelMask, min_pixels: usize) -> Vec<Contour> {
        let width = mask.width();
        let height = mask.height();
        let mut contours = Vec::new();
        if width < 3 || height < 3 {
            return contours;
        }

        let mut visited = vec![false; width as usize * height as usize];

        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let index = mask.index(x, y);
                if visited[index] || !mask.get(x, y) {
                    continue;
                }

                let points = trace_region(mask, Point::new(x, y), &mut visited);
                if points.len() >= min_pixels {
                    contours.push(Contour::from_points(points));
                }
            }
        }

        contours
    }

    /// Collects all foreground pixels reachable from `seed`, marking them visited.
    fn trace_region(mask: &PixelMask, seed: Point, visited: &mut [bool]) -> Vec<Point> {
        let width = mask.width() as i64;
        let height = mask.height() as i64;
        let mut region = Vec::new();
        let mut stack = vec![seed];
        visited[mask.index(seed.x, seed.y)] = true;

        while let Some(current) = stack.pop() {
            region.push(current);

            for (dx, dy) in NEIGHBOURS {
                let nx = current.x as i64 + dx;
                let ny = current.y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width || ny >= height {
                    continue;
                }

                let (nx, ny) = (nx as u32, ny as u32);
                let index = mask.index(nx, ny);
                if !visited[index] && mask.get(nx, ny) {
                    visited[index] = true;
                    stack.push(Point::new(nx, ny));
                }
            }
        }

        region
    }
}
