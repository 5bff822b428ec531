// THEORY:
// The shape classifier scores every contour against every registered pattern
// and emits a `Detection` for each pair whose confidence clears the pattern's
// sensitivity. It is a stateless, explainable heuristic: each confidence is a
// weighted sum of four named sub-scores, so a surprising result can always be
// traced back to a number.
//
// Scoring, per (contour, pattern):
// 1.  **Area gate**: a contour whose pixel count falls outside
//     [area_min, area_max] is rejected outright. This is a hard reject, not a
//     weighted term; gated contours never produce a detection.
// 2.  **Structure**: the kind-specific signal, provided by a `ShapeScorer`:
//     - L: right-angle turns along the traversal path;
//     - T: a heavy top band against a light bottom band;
//     - cross: pixel mass concentrated near the centre rather than the rim.
// 3.  **Rectangularity**: pixel count over bounding-box area.
// 4.  **Symmetry**: mirror-axis correlation. The fraction of pixels whose mirror
//     image across the bounding box's vertical (and, for a cross, horizontal)
//     centre line is also foreground.
// 5.  **Aspect**: linear fall-off from the pattern's ideal width/height ratio.
//
// Fault isolation: a pattern that fails (or panics) on any contour contributes
// nothing for the frame. The failure is logged and reported by id, and the
// remaining patterns still run. Cross-pattern deduplication is not done here.

use crate::core_modules::contour::{Contour, Point};
use crate::core_modules::detection::Detection;
use crate::core_modules::frame::Millis;
use crate::core_modules::shape_pattern::{ShapeKind, ShapePattern};
use crate::error::{Result, ShapeError};
use log::warn;
use std::panic::{self, AssertUnwindSafe};

/// Inclusive pixel-count range a contour must fall in to be scored at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaGate {
    pub min: usize,
    pub max: usize,
}

impl AreaGate {
    pub fn admits(&self, area: usize) -> bool {
        area >= self.min && area <= self.max
    }
}

impl Default for AreaGate {
    fn default() -> Self {
        Self { min: 1000, max: 50000 }
    }
}

/// The individual terms behind one confidence value, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SubScores {
    pub structure: f64,
    pub rectangularity: f64,
    pub symmetry: f64,
    pub aspect: f64,
}

/// The kind-specific part of scoring.
pub trait ShapeScorer: Send + Sync {
    fn structure(&self, contour: &Contour) -> f64;
    fn symmetry(&self, contour: &Contour) -> f64;
}

pub struct LShapeScorer;
pub struct TShapeScorer;
pub struct CrossScorer;

const CORNER_WINDOW: usize = 5;
const CORNER_MIN_TURN_DEGREES: f64 = 60.0;
const RIGHT_ANGLE_TOLERANCE_DEGREES: f64 = 15.0;
const CORNER_CONTRIBUTION: f64 = 0.3;

impl ShapeScorer for LShapeScorer {
    fn structure(&self, contour: &Contour) -> f64 {
        corner_score(&contour.points)
    }

    fn symmetry(&self, contour: &Contour) -> f64 {
        mirror_symmetry(contour, Axis::Vertical)
    }
}

impl ShapeScorer for TShapeScorer {
    fn structure(&self, contour: &Contour) -> f64 {
        let bounds = contour.bounding_box;
        let mut top = 0usize;
        let mut bottom = 0usize;
        for point in &contour.points {
            let row = point.y as f64 - bounds.y + 0.5;
            if row < bounds.height * 0.3 {
                top += 1;
            } else if row > bounds.height * 0.7 {
                bottom += 1;
            }
        }

        let ratio = top as f64 / (bottom as f64 + 1.0);
        if ratio > 2.0 { 0.8 } else { (ratio * 0.4).min(1.0) }
    }

    fn symmetry(&self, contour: &Contour) -> f64 {
        mirror_symmetry(contour, Axis::Vertical)
    }
}

impl ShapeScorer for CrossScorer {
    fn structure(&self, contour: &Contour) -> f64 {
        let bounds = contour.bounding_box;
        let (center_x, center_y) = bounds.center();
        let reach = bounds.width.min(bounds.height);
        let mut central = 0usize;
        let mut peripheral = 0usize;
        for point in &contour.points {
            let dx = point.x as f64 + 0.5 - center_x;
            let dy = point.y as f64 + 0.5 - center_y;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance < reach * 0.3 {
                central += 1;
            } else if distance > reach * 0.4 {
                peripheral += 1;
            }
        }

        let ratio = central as f64 / (peripheral as f64 + 1.0);
        if ratio > 0.5 { 0.8 } else { (ratio * 1.6).min(1.0) }
    }

    fn symmetry(&self, contour: &Contour) -> f64 {
        (mirror_symmetry(contour, Axis::Vertical) + mirror_symmetry(contour, Axis::Horizontal)) / 2.0
    }
}

impl ShapeKind {
    pub fn scorer(&self) -> &'static dyn ShapeScorer {
        match self {
            ShapeKind::LShape => &LShapeScorer,
            ShapeKind::TShape => &TShapeScorer,
            ShapeKind::Cross => &CrossScorer,
        }
    }
}

/// Direction changes along `points` measured over a +/- `CORNER_WINDOW` span.
/// Returns the turn angle in degrees (0..=180) of every position whose turn
/// exceeds `CORNER_MIN_TURN_DEGREES`.
pub fn find_corners(points: &[Point]) -> Vec<f64> {
    let mut corners = Vec::new();
    if points.len() <= 2 * CORNER_WINDOW {
        return corners;
    }

    for i in CORNER_WINDOW..points.len() - CORNER_WINDOW {
        let prev = points[i - CORNER_WINDOW];
        let curr = points[i];
        let next = points[i + CORNER_WINDOW];

        let incoming = (curr.y as f64 - prev.y as f64).atan2(curr.x as f64 - prev.x as f64);
        let outgoing = (next.y as f64 - curr.y as f64).atan2(next.x as f64 - curr.x as f64);

        let mut turn = (outgoing - incoming).abs().to_degrees();
        if turn > 180.0 {
            turn = 360.0 - turn;
        }
        if turn > CORNER_MIN_TURN_DEGREES {
            corners.push(turn);
        }
    }

    corners
}

/// Each near-right-angle corner adds `CORNER_CONTRIBUTION`, capped at 1.0.
pub fn corner_score(points: &[Point]) -> f64 {
    let right_angles = find_corners(points)
        .into_iter()
        .filter(|turn| (turn - 90.0).abs() < RIGHT_ANGLE_TOLERANCE_DEGREES)
        .count();
    (right_angles as f64 * CORNER_CONTRIBUTION).min(1.0)
}

pub fn rectangularity(contour: &Contour) -> f64 {
    let box_area = contour.bounding_box.area();
    if box_area <= 0.0 {
        return 0.0;
    }
    (contour.area as f64 / box_area).min(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Mirror left/right across the vertical centre line.
    Vertical,
    /// Mirror top/bottom across the horizontal centre line.
    Horizontal,
}

/// Fraction of the contour's pixels whose mirror image across `axis` is also in the contour.
pub fn mirror_symmetry(contour: &Contour, axis: Axis) -> f64 {
    if contour.points.is_empty() {
        return 0.0;
    }

    let origin_x = contour.bounding_box.x as u32;
    let origin_y = contour.bounding_box.y as u32;
    let width = contour.bounding_box.width as usize;
    let height = contour.bounding_box.height as usize;

    let mut local = vec![false; width * height];
    for point in &contour.points {
        let lx = (point.x - origin_x) as usize;
        let ly = (point.y - origin_y) as usize;
        local[ly * width + lx] = true;
    }

    let mirrored = contour
        .points
        .iter()
        .filter(|point| {
            let lx = (point.x - origin_x) as usize;
            let ly = (point.y - origin_y) as usize;
            let (mx, my) = match axis {
                Axis::Vertical => (width - 1 - lx, ly),
                Axis::Horizontal => (lx, height - 1 - ly),
            };
            local[my * width + mx]
        })
        .count();

    mirrored as f64 / contour.points.len() as f64
}

/// Computes every sub-score of `contour` for `pattern`'s kind.
pub fn sub_scores(pattern: &ShapePattern, contour: &Contour) -> Result<SubScores> {
    let bounds = contour.bounding_box;
    if contour.points.is_empty() || bounds.width < 1.0 || bounds.height < 1.0 {
        return Err(ShapeError::DegenerateContour { x: bounds.x, y: bounds.y });
    }

    let scorer = pattern.kind.scorer();
    Ok(SubScores {
        structure: scorer.structure(contour),
        rectangularity: rectangularity(contour),
        symmetry: scorer.symmetry(contour),
        aspect: pattern.aspect.score(contour.aspect_ratio),
    })
}

/// Confidence of `contour` being `pattern`, in [0, 1]. Gated contours score 0.
pub fn score_contour(pattern: &ShapePattern, contour: &Contour, gate: AreaGate) -> Result<f64> {
    if !gate.admits(contour.area) {
        return Ok(0.0);
    }

    let scores = sub_scores(pattern, contour)?;
    let weights = pattern.weights;
    let confidence = scores.structure * weights.structure
        + scores.rectangularity * weights.rectangularity
        + scores.symmetry * weights.symmetry
        + scores.aspect * weights.aspect;

    if !confidence.is_finite() {
        return Err(ShapeError::NonFiniteScore {
            pattern: pattern.id.clone(),
        });
    }
    Ok(confidence.clamp(0.0, 1.0))
}

/// All detections of one pattern in one frame, or the first fault it hit.
pub fn classify_pattern(
    pattern: &ShapePattern,
    contours: &[Contour],
    gate: AreaGate,
    timestamp: Millis,
) -> Result<Vec<Detection>> {
    let mut detections = Vec::new();
    for contour in contours {
        if !gate.admits(contour.area) {
            continue;
        }
        let confidence = score_contour(pattern, contour, gate)?;
        if confidence >= pattern.sensitivity {
            detections.push(Detection::new(&pattern.id, contour.bounding_box, confidence, timestamp));
        }
    }
    Ok(detections)
}

/// The merged output of several independently scored patterns.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub detections: Vec<Detection>,
    /// Ids of patterns that faulted this frame and contributed nothing.
    pub faulted: Vec<String>,
}

impl Classification {
    /// Folds one pattern's outcome in, containing its fault.
    pub fn absorb(&mut self, pattern_id: &str, outcome: Result<Vec<Detection>>) {
        match outcome {
            Ok(detections) => self.detections.extend(detections),
            Err(err) => {
                warn!("pattern `{}` skipped for this frame: {}", pattern_id, err);
                self.faulted.push(pattern_id.to_string());
            }
        }
    }

    /// Runs one pattern's work and absorbs its outcome. A panic inside `job` is
    /// contained like any other fault.
    pub fn absorb_contained(&mut self, pattern_id: &str, job: impl FnOnce() -> Result<Vec<Detection>>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(job))
            .unwrap_or_else(|_| Err(ShapeError::PatternPanicked(pattern_id.to_string())));
        self.absorb(pattern_id, outcome);
    }

    /// Appends `other` after everything already collected.
    pub fn merge(&mut self, other: Classification) {
        self.detections.extend(other.detections);
        self.faulted.extend(other.faulted);
    }
}

/// Scores every contour against every pattern, in registry order.
pub fn classify(patterns: &[ShapePattern], contours: &[Contour], gate: AreaGate, timestamp: Millis) -> Classification {
    let mut classification = Classification::default();
    for pattern in patterns {
        classification.absorb_contained(&pattern.id, || classify_pattern(pattern, contours, gate, timestamp));
    }
    classification
}
