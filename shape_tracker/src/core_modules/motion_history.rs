// THEORY:
// Each tracked shape keeps a short memory of where it has been so the renderer
// can be handed a slightly-ahead position instead of a lagging one. The memory
// is a fixed-capacity ring: slots are allocated once when the shape is born and
// the oldest sample is overwritten in place, so recording a sample never
// allocates and is O(1).
//
// Prediction is constant-velocity: the mean velocity over the last few samples
// is extrapolated a fixed horizon forward. With fewer than two samples there is
// no velocity and the latest position is returned unchanged.

use crate::core_modules::frame::Millis;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub x: f64,
    pub y: f64,
    pub timestamp: Millis,
}

/// Index-based ring of the last `capacity` samples.
#[derive(Debug, Clone)]
pub struct MotionHistory {
    slots: Vec<MotionSample>,
    capacity: usize,
    /// Slot the next sample is written to.
    head: usize,
}

impl MotionHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    pub fn record(&mut self, sample: MotionSample) {
        if self.slots.len() < self.capacity {
            self.slots.push(sample);
        } else {
            self.slots[self.head] = sample;
        }
        self.head = (self.head + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Samples oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MotionSample> {
        let split = if self.slots.len() < self.capacity { 0 } else { self.head };
        self.slots[split..].iter().chain(self.slots[..split].iter())
    }

    pub fn latest(&self) -> Option<&MotionSample> {
        self.iter().last()
    }

    /// Mean velocity in px/ms over the last `window` samples. Intervals with a
    /// non-positive time step contribute zero but still count toward the mean.
    pub fn velocity(&self, window: usize) -> Option<(f64, f64)> {
        let skip = self.len().saturating_sub(window);
        let recent: Vec<&MotionSample> = self.iter().skip(skip).collect();
        if recent.len() < 2 {
            return None;
        }

        let (mut vx, mut vy) = (0.0, 0.0);
        for pair in recent.windows(2) {
            let dt = pair[1].timestamp as f64 - pair[0].timestamp as f64;
            if dt > 0.0 {
                vx += (pair[1].x - pair[0].x) / dt;
                vy += (pair[1].y - pair[0].y) / dt;
            }
        }

        let intervals = (recent.len() - 1) as f64;
        Some((vx / intervals, vy / intervals))
    }

    /// Extrapolates the latest sample `horizon_ms` ahead at the mean velocity.
    pub fn predict(&self, window: usize, horizon_ms: f64) -> Option<(f64, f64)> {
        let latest = self.latest()?;
        Some(match self.velocity(window) {
            Some((vx, vy)) => (latest.x + vx * horizon_ms, latest.y + vy * horizon_ms),
            None => (latest.x, latest.y),
        })
    }
}
