// THEORY:
// A `Detection` is the single currency between the detection stages and the
// tracker: one record per accepted (pattern, region) pair per frame. It carries
// no identity and does not outlive the frame that produced it. Both the contour
// classifier and the template matcher emit this same record, so the tracker does
// not care where a detection came from.

use crate::core_modules::contour::BoundingBox;
use crate::core_modules::frame::Millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionSource {
    Contour,
    Template { scale: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub pattern_id: String,
    pub bounding_box: BoundingBox,
    /// In [0, 1].
    pub confidence: f64,
    pub timestamp: Millis,
    pub source: DetectionSource,
}

impl Detection {
    pub fn new(pattern_id: &str, bounding_box: BoundingBox, confidence: f64, timestamp: Millis) -> Self {
        Self {
            pattern_id: pattern_id.to_string(),
            bounding_box,
            confidence,
            timestamp,
            source: DetectionSource::Contour,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        self.bounding_box.center()
    }
}
