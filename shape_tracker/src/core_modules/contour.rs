// THEORY:
// A `Contour` is a single connected region of foreground pixels in one frame
// together with its geometric summary. It is the bridge between raw pixels and
// shape reasoning: the classifier never looks at the mask again, only at the
// points and the derived numbers stored here.
//
// Key points:
// 1.  **Traversal order matters**: `points` is kept in the order the flood fill
//     visited them. The perimeter and the corner detector both walk this order,
//     so it must be reproducible for identical input.
// 2.  **Perimeter is an approximation**: it is the length of the path through
//     the traversal order, not the length of the true boundary. For a filled
//     region it grows with area, and it is only ever compared against itself.
// 3.  **Stateless**: like every per-frame record, a contour has no memory of
//     earlier frames and is dropped once classification is done.

use serde::{Deserialize, Serialize};

/// A pixel coordinate in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// An axis-aligned box in pixel units. `width` and `height` count pixels, so a
/// single pixel has a 1x1 box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }
}

/// A connected foreground region and its derived geometry.
#[derive(Debug, Clone)]
pub struct Contour {
    /// Every pixel of the region, in flood-fill traversal order.
    pub points: Vec<Point>,
    pub bounding_box: BoundingBox,
    /// Pixel count.
    pub area: usize,
    /// Path length through `points`; see the module notes.
    pub perimeter: f64,
    /// `bounding_box.width / bounding_box.height`.
    pub aspect_ratio: f64,
    /// Mean pixel-centre position of the region.
    pub centroid: (f64, f64),
}

impl Contour {
    /// Derives the geometric summary of a traced region. `points` must not be empty.
    pub fn from_points(points: Vec<Point>) -> Self {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;

        for point in &points {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
            sum_x += point.x as f64 + 0.5;
            sum_y += point.y as f64 + 0.5;
        }

        let perimeter = points
            .windows(2)
            .map(|pair| pair[0].distance_to(&pair[1]))
            .sum();

        let area = points.len();
        let bounding_box = BoundingBox::new(
            min_x as f64,
            min_y as f64,
            (max_x - min_x + 1) as f64,
            (max_y - min_y + 1) as f64,
        );

        Self {
            aspect_ratio: bounding_box.width / bounding_box.height,
            centroid: (sum_x / area as f64, sum_y / area as f64),
            points,
            bounding_box,
            area,
            perimeter,
        }
    }
}
