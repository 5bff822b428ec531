// THEORY:
// The `tracker` module adds memory to the engine. It takes the stateless list of
// `Detection`s from a single frame and associates them with the shapes it was
// tracking in previous frames, so an overlay can stay glued to an object instead
// of blinking in and out with every noisy frame.
//
// Key architectural principles:
// 1.  **Object Persistence**: a `TrackedShape` is one object's existence over
//     time, keyed by a monotonically increasing id. Its pattern id is fixed at
//     birth; detections of another pattern can never feed it.
// 2.  **Greedy Association**: each detection, in arrival order, is matched to the
//     nearest not-yet-matched shape of the same pattern whose last measured
//     centre lies strictly within the tracking tolerance. Ties go to the lowest
//     id. This is not a globally optimal assignment and can swap ids when two
//     shapes of the same pattern cross.
// 3.  **Smoothing**: a match blends the measured box into the stored one with an
//     exponential moving average, and the confidence drifts slowly toward the
//     measured one. There is no covariance state; this is deliberately not a
//     Kalman filter.
// 4.  **Lifecycle**: New -> Active -> Stable -> removed. A shape becomes stable
//     after enough consecutive matched frames and stays stable; a miss before
//     that restarts the count. A shape unseen for longer than the max age is
//     removed together with its motion history.
// 5.  **Single writer**: the table is owned by one `Tracker` and only mutated
//     through `update`. Renderers only ever see `TrackedSnapshot` copies.

use crate::config::TrackerConfig;
use crate::core_modules::contour::BoundingBox;
use crate::core_modules::detection::Detection;
use crate::core_modules::frame::Millis;
use crate::core_modules::motion_history::{MotionHistory, MotionSample};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedState {
    New,
    Active,
    Stable,
}

/// An object that is being tracked across multiple frames.
#[derive(Debug, Clone)]
pub struct TrackedShape {
    pub id: u64,
    pub pattern_id: String,
    /// Smoothed position and size.
    pub bounding_box: BoundingBox,
    /// The raw box of the most recent matched detection, used for association.
    pub last_measured: BoundingBox,
    pub confidence: f64,
    pub first_seen: Millis,
    pub last_seen: Millis,
    pub seen: bool,
    pub stable: bool,
    /// Consecutive matched frames while not yet stable. Frozen once stable.
    pub frame_count: u32,
    /// Matched frames over the whole lifetime. A miss does not reset it.
    pub age: u32,
    pub history: MotionHistory,
}

impl TrackedShape {
    fn new(id: u64, detection: &Detection, now: Millis, config: &TrackerConfig) -> Self {
        let mut history = MotionHistory::with_capacity(config.history_capacity);
        history.record(MotionSample {
            x: detection.bounding_box.x,
            y: detection.bounding_box.y,
            timestamp: now,
        });
        Self {
            id,
            pattern_id: detection.pattern_id.clone(),
            bounding_box: detection.bounding_box,
            last_measured: detection.bounding_box,
            confidence: detection.confidence,
            first_seen: now,
            last_seen: now,
            seen: true,
            stable: false,
            frame_count: 1,
            age: 1,
            history,
        }
    }

    /// Folds a matched detection into the smoothed state.
    fn absorb(&mut self, detection: &Detection, now: Millis, config: &TrackerConfig) {
        let alpha = config.smoothing_factor;
        let blend = |old: f64, measured: f64| old * (1.0 - alpha) + measured * alpha;
        let measured = detection.bounding_box;

        self.bounding_box = BoundingBox::new(
            blend(self.bounding_box.x, measured.x),
            blend(self.bounding_box.y, measured.y),
            blend(self.bounding_box.width, measured.width),
            blend(self.bounding_box.height, measured.height),
        );
        self.last_measured = measured;

        let retention = config.confidence_retention;
        self.confidence = (self.confidence * retention + detection.confidence * (1.0 - retention)).min(1.0);

        self.last_seen = now;
        self.seen = true;
        self.age = self.age.saturating_add(1);
        if !self.stable {
            self.frame_count += 1;
            self.stable = self.frame_count >= config.stable_after_frames;
        }

        self.history.record(MotionSample {
            x: self.bounding_box.x,
            y: self.bounding_box.y,
            timestamp: now,
        });
    }

    pub fn state(&self) -> TrackedState {
        if self.stable {
            TrackedState::Stable
        } else if self.age <= 1 {
            TrackedState::New
        } else {
            TrackedState::Active
        }
    }

    /// Where the top-left corner should be drawn, a short horizon ahead of now.
    pub fn predicted_position(&self, config: &TrackerConfig) -> (f64, f64) {
        self.history
            .predict(config.velocity_window, config.prediction_horizon_ms)
            .unwrap_or((self.bounding_box.x, self.bounding_box.y))
    }

    fn measured_distance(&self, detection: &Detection) -> f64 {
        let (ax, ay) = self.last_measured.center();
        let (bx, by) = detection.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// One renderable entry of the stable set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSnapshot {
    pub id: u64,
    pub pattern_id: String,
    pub bounding_box: BoundingBox,
    pub predicted_position: (f64, f64),
    pub confidence: f64,
}

/// Owns the identity table for one detection session.
#[derive(Debug)]
pub struct Tracker {
    shapes: BTreeMap<u64, TrackedShape>,
    next_id: u64,
    config: TrackerConfig,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            shapes: BTreeMap::new(),
            next_id: 0,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Advances the table by one frame and returns the stable snapshot.
    pub fn update(&mut self, detections: &[Detection], now: Millis) -> Vec<TrackedSnapshot> {
        for shape in self.shapes.values_mut() {
            shape.seen = false;
        }

        // --- 1. Association ---
        for detection in detections {
            let mut best: Option<(u64, f64)> = None;
            for shape in self.shapes.values() {
                if shape.seen || shape.pattern_id != detection.pattern_id {
                    continue;
                }
                let distance = shape.measured_distance(detection);
                if distance < self.config.tracking_tolerance && best.is_none_or(|(_, d)| distance < d) {
                    best = Some((shape.id, distance));
                }
            }

            match best.and_then(|(id, _)| self.shapes.get_mut(&id)) {
                Some(shape) => shape.absorb(detection, now, &self.config),
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    debug!("new tracked shape {} ({})", id, detection.pattern_id);
                    self.shapes.insert(id, TrackedShape::new(id, detection, now, &self.config));
                }
            }
        }

        // --- 2. Lifecycle ---
        let max_age = self.config.max_age_ms;
        self.shapes.retain(|id, shape| {
            if shape.seen {
                return true;
            }
            if !shape.stable {
                shape.frame_count = 0;
            }
            let keep = now.saturating_sub(shape.last_seen) <= max_age;
            if !keep {
                debug!("tracked shape {} ({}) lost", id, shape.pattern_id);
            }
            keep
        });

        self.snapshot()
    }

    /// Stable shapes whose smoothed confidence clears the threshold, by id.
    pub fn snapshot(&self) -> Vec<TrackedSnapshot> {
        self.shapes
            .values()
            .filter(|shape| shape.stable && shape.confidence > self.config.confidence_threshold)
            .map(|shape| TrackedSnapshot {
                id: shape.id,
                pattern_id: shape.pattern_id.clone(),
                bounding_box: shape.bounding_box,
                predicted_position: shape.predicted_position(&self.config),
                confidence: shape.confidence,
            })
            .collect()
    }

    /// Every live shape, stable or not, by id.
    pub fn shapes(&self) -> impl Iterator<Item = &TrackedShape> {
        self.shapes.values()
    }

    pub fn get(&self, id: u64) -> Option<&TrackedShape> {
        self.shapes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(pattern: &str, x: f64, y: f64, confidence: f64) -> Detection {
        Detection::new(pattern, BoundingBox::new(x, y, 20.0, 20.0), confidence, 0)
    }

    fn tracker() -> Tracker {
        Tracker::new(TrackerConfig::default())
    }

    #[test]
    fn stabilises_after_five_consecutive_frames() {
        let mut tracker = tracker();
        for frame in 0..4 {
            tracker.update(&[detection("forma_T", 10.0, 10.0, 0.9)], frame * 33);
        }
        let shape = tracker.shapes().next().unwrap();
        assert!(!shape.stable);
        assert_eq!(shape.state(), TrackedState::Active);

        let snapshot = tracker.update(&[detection("forma_T", 10.0, 10.0, 0.9)], 4 * 33);
        assert!(tracker.get(0).unwrap().stable);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn a_miss_restarts_the_stable_count() {
        let mut tracker = tracker();
        for frame in 0..3 {
            tracker.update(&[detection("forma_L", 10.0, 10.0, 0.9)], frame * 33);
        }
        tracker.update(&[], 100);
        assert_eq!(tracker.get(0).unwrap().frame_count, 0);
        assert_eq!(tracker.get(0).unwrap().state(), TrackedState::Active);
        tracker.update(&[detection("forma_L", 10.0, 10.0, 0.9)], 3 * 33 + 10);
        assert_eq!(tracker.get(0).unwrap().state(), TrackedState::Active);
        assert_eq!(tracker.get(0).unwrap().age, 4);
        for frame in 4..7 {
            tracker.update(&[detection("forma_L", 10.0, 10.0, 0.9)], frame * 33);
        }
        assert!(!tracker.get(0).unwrap().stable);
        tracker.update(&[detection("forma_L", 10.0, 10.0, 0.9)], 8 * 33);
        assert!(tracker.get(0).unwrap().stable);
    }

    #[test]
    fn stable_shapes_stop_counting_frames() {
        let mut tracker = tracker();
        for frame in 0..40 {
            tracker.update(&[detection("forma_T", 10.0, 10.0, 0.9)], frame * 33);
        }
        let shape = tracker.get(0).unwrap();
        assert_eq!(shape.frame_count, TrackerConfig::default().stable_after_frames);
        assert_eq!(shape.age, 40);
        assert_eq!(shape.state(), TrackedState::Stable);
    }

    #[test]
    fn expires_strictly_after_max_age() {
        let mut tracker = tracker();
        tracker.update(&[detection("forma_cruz", 10.0, 10.0, 0.9)], 0);
        tracker.update(&[], 999);
        assert_eq!(tracker.len(), 1);
        tracker.update(&[], 1001);
        assert!(tracker.is_empty());
    }

    #[test]
    fn identity_persists_under_steady_motion() {
        let mut tracker = tracker();
        for frame in 0..10u64 {
            let x = 10.0 + 45.0 * frame as f64;
            tracker.update(&[detection("forma_T", x, 40.0, 0.9)], frame * 33);
        }
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.shapes().next().unwrap().id, 0);
    }

    #[test]
    fn jittered_cross_converges_and_stabilises() {
        let mut tracker = tracker();
        let jitter = [(0.0, 0.0), (3.0, -2.0), (-4.0, 1.0), (2.0, 4.0), (-1.0, -3.0), (1.0, 2.0)];
        let mut snapshot = Vec::new();
        for (frame, (dx, dy)) in jitter.iter().enumerate() {
            snapshot = tracker.update(&[detection("forma_cruz", 50.0 + dx, 50.0 + dy, 0.9)], frame as u64 * 33);
        }
        assert_eq!(snapshot.len(), 1);
        let shape = &snapshot[0];
        assert!((shape.bounding_box.x - 50.0).abs() < 5.0);
        assert!((shape.bounding_box.y - 50.0).abs() < 5.0);
        assert!((shape.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn patterns_never_share_an_entity() {
        let mut tracker = tracker();
        let frame = [detection("forma_T", 10.0, 10.0, 0.9), detection("forma_L", 10.0, 10.0, 0.9)];
        tracker.update(&frame, 0);
        tracker.update(&frame, 33);
        assert_eq!(tracker.len(), 2);
        let ids: Vec<&str> = tracker.shapes().map(|s| s.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["forma_T", "forma_L"]);
    }

    #[test]
    fn one_shape_absorbs_at_most_one_detection_per_frame() {
        let mut tracker = tracker();
        tracker.update(&[detection("forma_T", 10.0, 10.0, 0.9)], 0);
        tracker.update(
            &[detection("forma_T", 12.0, 10.0, 0.9), detection("forma_T", 14.0, 10.0, 0.9)],
            33,
        );
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.get(0).unwrap().last_measured.x, 12.0);
    }

    #[test]
    fn low_confidence_shapes_stay_out_of_the_snapshot() {
        let mut tracker = tracker();
        let mut snapshot = Vec::new();
        for frame in 0..6 {
            snapshot = tracker.update(&[detection("forma_L", 10.0, 10.0, 0.65)], frame * 33);
        }
        assert!(tracker.get(0).unwrap().stable);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn history_is_bounded_and_prediction_leads_motion() {
        let mut tracker = tracker();
        for frame in 0..15u64 {
            tracker.update(&[detection("forma_T", 10.0 * frame as f64, 0.0, 0.9)], frame * 100);
        }
        let shape = tracker.get(0).unwrap();
        assert_eq!(shape.history.len(), TrackerConfig::default().history_capacity);
        let (predicted_x, _) = shape.predicted_position(tracker.config());
        assert!(predicted_x > shape.bounding_box.x);
    }

    #[test]
    fn fresh_shape_predicts_its_own_position() {
        let mut tracker = tracker();
        tracker.update(&[detection("forma_T", 33.0, 44.0, 0.9)], 0);
        let shape = tracker.get(0).unwrap();
        assert_eq!(shape.state(), TrackedState::New);
        assert_eq!(shape.predicted_position(tracker.config()), (33.0, 44.0));
    }
}
