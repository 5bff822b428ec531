// THEORY:
// The `pipeline` module is the top-level API of the engine. It encapsulates the
// full stack (preprocess -> contours -> classification and template matching ->
// tracking) behind one call per frame, so a frame source only has to hand over a
// `Frame` and a renderer only has to read the `FrameReport` that comes back.
//
// It is split in two halves:
// - `DetectionStages` is everything that is read-only for a session: the
//   detector settings, the pattern registry and the loaded templates. It holds
//   no per-frame state, which is what lets the parallel pipeline share it
//   between worker threads.
// - The `Tracker` is the only mutable state. It is updated exactly once per
//   frame, after all detection work for that frame has finished.
//
// Per-frame faults never escape: a failing or panicking pattern or template is
// listed in the report and the frame carries on without it.

use crate::config::PipelineConfig;
use crate::core_modules::contour::{BoundingBox, Contour};
use crate::core_modules::contour_extractor::contour_extractor::find_contours;
use crate::core_modules::detection::Detection;
use crate::core_modules::frame::{Frame, Millis};
use crate::core_modules::pixel_mask::pixel_mask::PixelMask;
use crate::core_modules::preprocessor::preprocessor::threshold_frame;
use crate::core_modules::shape_classifier::{Classification, classify, classify_pattern};
use crate::core_modules::shape_pattern::{DisplayMetadata, ShapeRegistry};
use crate::core_modules::template_matcher::{DEFAULT_MAX_MATCHES, ReferenceTemplate, TemplateMatcher, match_template};
use crate::core_modules::tracker::{TrackedShape, TrackedSnapshot, Tracker};
use crate::error::Result;
use log::trace;
use serde::{Deserialize, Serialize};

// Re-export key data structures for the public API.
pub use crate::core_modules::shape_classifier::AreaGate;
pub use crate::core_modules::tracker::TrackedState;

/// One tracked shape as a renderer needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeOverlay {
    pub id: u64,
    pub pattern_id: String,
    /// Smoothed box.
    pub bounding_box: BoundingBox,
    /// Top-left corner to draw at, extrapolated slightly ahead.
    pub predicted_position: (f64, f64),
    pub confidence: f64,
    pub display: Option<DisplayMetadata>,
}

/// The primary output of the pipeline for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub timestamp_ms: Millis,
    pub contour_count: usize,
    pub detection_count: usize,
    /// Patterns and templates that faulted on this frame and contributed nothing.
    pub faulted_patterns: Vec<String>,
    pub overlays: Vec<ShapeOverlay>,
}

/// What the detection stages extract from a frame before any pattern runs.
#[derive(Debug, Clone, Default)]
pub(crate) struct PreparedFrame {
    pub contours: Vec<Contour>,
    /// Only built when there are templates to match.
    pub template_mask: Option<PixelMask>,
}

/// One independent unit of per-frame detection work.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DetectionJob {
    Pattern(usize),
    Template(usize),
}

/// The read-only half of a session.
#[derive(Debug)]
pub(crate) struct DetectionStages {
    pub config: PipelineConfig,
    pub registry: ShapeRegistry,
    pub matcher: TemplateMatcher,
}

impl DetectionStages {
    fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let mut registry = ShapeRegistry::new();
        for pattern in config.shape_patterns() {
            registry.register(pattern)?;
        }

        let matcher = TemplateMatcher::load_all(&config.templates, config.detector.template_threshold);
        for spec in &config.templates {
            registry.register_display(&spec.id, spec.display_or_default())?;
        }

        Ok(Self {
            config,
            registry,
            matcher,
        })
    }

    pub fn prepare(&self, frame: &Frame) -> PreparedFrame {
        let detector = &self.config.detector;
        let mask = threshold_frame(frame, detector.contrast_threshold);
        let contours = find_contours(&mask, detector.min_contour_pixels);
        let template_mask = (!self.matcher.is_empty()).then(|| threshold_frame(frame, detector.template_threshold));
        PreparedFrame {
            contours,
            template_mask,
        }
    }

    /// Patterns in registry order, then templates in load order.
    pub fn jobs(&self) -> Vec<DetectionJob> {
        let patterns = (0..self.registry.patterns().len()).map(DetectionJob::Pattern);
        let templates = (0..self.matcher.templates().len()).map(DetectionJob::Template);
        patterns.chain(templates).collect()
    }

    pub fn job_id(&self, job: DetectionJob) -> &str {
        match job {
            DetectionJob::Pattern(index) => &self.registry.patterns()[index].id,
            DetectionJob::Template(index) => &self.matcher.templates()[index].pattern_id,
        }
    }

    pub fn run_job(&self, job: DetectionJob, prepared: &PreparedFrame, timestamp: Millis) -> Result<Vec<Detection>> {
        match job {
            DetectionJob::Pattern(index) => classify_pattern(
                &self.registry.patterns()[index],
                &prepared.contours,
                self.config.detector.area_gate(),
                timestamp,
            ),
            DetectionJob::Template(index) => {
                let template = &self.matcher.templates()[index];
                match &prepared.template_mask {
                    Some(mask) => match_template(mask, template, DEFAULT_MAX_MATCHES, timestamp),
                    None => Ok(Vec::new()),
                }
            }
        }
    }

    pub fn detect(&self, frame: &Frame) -> (usize, Classification) {
        let prepared = self.prepare(frame);
        let mut classification = classify(
            self.registry.patterns(),
            &prepared.contours,
            self.config.detector.area_gate(),
            frame.timestamp,
        );
        if let Some(mask) = &prepared.template_mask {
            classification.merge(self.matcher.match_all(mask, frame.timestamp));
        }
        (prepared.contours.len(), classification)
    }

    pub fn report(
        &self,
        timestamp: Millis,
        contour_count: usize,
        classification: Classification,
        snapshot: Vec<TrackedSnapshot>,
    ) -> FrameReport {
        let overlays = snapshot
            .into_iter()
            .map(|shape| ShapeOverlay {
                display: self.registry.display(&shape.pattern_id).cloned(),
                id: shape.id,
                pattern_id: shape.pattern_id,
                bounding_box: shape.bounding_box,
                predicted_position: shape.predicted_position,
                confidence: shape.confidence,
            })
            .collect();

        FrameReport {
            timestamp_ms: timestamp,
            contour_count,
            detection_count: classification.detections.len(),
            faulted_patterns: classification.faulted,
            overlays,
        }
    }
}

/// The main, top-level struct for the engine.
#[derive(Debug)]
pub struct ShapePipeline {
    pub(crate) stages: DetectionStages,
    pub(crate) tracker: Tracker,
}

impl ShapePipeline {
    /// Builds a session. Templates that fail to load are logged and skipped.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let tracker = Tracker::new(config.tracker.clone());
        Ok(Self {
            stages: DetectionStages::new(config)?,
            tracker,
        })
    }

    /// Adds an in-memory reference template before frames start flowing.
    pub fn with_template(mut self, template: ReferenceTemplate, display: DisplayMetadata) -> Result<Self> {
        self.stages.registry.register_display(&template.pattern_id, display)?;
        self.stages.matcher.push(template);
        Ok(self)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.stages.config
    }

    pub fn registry(&self) -> &ShapeRegistry {
        &self.stages.registry
    }

    /// Runs the detection stages only. The tracker is not touched.
    pub fn detect(&self, frame: &Frame) -> Vec<Detection> {
        self.stages.detect(frame).1.detections
    }

    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let (contour_count, classification) = self.stages.detect(frame);
        let snapshot = self.tracker.update(&classification.detections, frame.timestamp);
        trace!(
            "frame {}ms: {} contours, {} detections, {} tracked",
            frame.timestamp,
            contour_count,
            classification.detections.len(),
            self.tracker.len()
        );
        self.stages.report(frame.timestamp, contour_count, classification, snapshot)
    }

    /// Every live tracked shape, stable or not, by id.
    pub fn tracked_shapes(&self) -> impl Iterator<Item = &TrackedShape> {
        self.tracker.shapes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateSpec;
    use std::path::PathBuf;

    fn square_frame(timestamp: Millis) -> Frame {
        let (width, height) = (100u32, 100u32);
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let value = if (10..40).contains(&x) && (10..40).contains(&y) { 255 } else { 0 };
                data.extend_from_slice(&[value, value, value, 255]);
            }
        }
        Frame::rgba(width, height, data, timestamp)
    }

    #[test]
    fn counts_contours_even_without_detections() {
        let mut pipeline = ShapePipeline::new(PipelineConfig::default()).unwrap();
        let report = pipeline.process_frame(&square_frame(0));
        assert_eq!(report.contour_count, 1);
        assert_eq!(report.timestamp_ms, 0);
        assert!(report.faulted_patterns.is_empty());
        // 900 px sits below the default area gate.
        assert_eq!(report.detection_count, 0);
        assert!(report.overlays.is_empty());
    }

    #[test]
    fn unreadable_templates_are_skipped_not_fatal() {
        let mut config = PipelineConfig::default();
        config.templates.push(TemplateSpec {
            id: "logo".to_string(),
            image: PathBuf::from("/nonexistent/logo.png"),
            sensitivity: 0.8,
            display: None,
        });
        let pipeline = ShapePipeline::new(config).unwrap();
        assert!(pipeline.stages.matcher.is_empty());
        assert!(pipeline.registry().display("logo").is_some());
    }

    #[test]
    fn detect_leaves_the_tracker_alone() {
        let pipeline = ShapePipeline::new(PipelineConfig::default()).unwrap();
        assert!(pipeline.detect(&square_frame(0)).is_empty());
        assert_eq!(pipeline.tracked_shapes().count(), 0);
    }
}
