// THEORY:
// The template matcher is the second, optional detection stage. Where the
// classifier reasons about geometry, the matcher simply asks "does this patch of
// the frame look like a known reference image?" and answers with binary
// correlation.
//
// Algorithm, per template:
// 1.  **Scales**: the template is tried at five fixed scale factors. A scale at
//     which the scaled template no longer fits the source is skipped.
// 2.  **Sliding window**: at each scale the window moves in steps of
//     `max(10, min(scaled_w, scaled_h) / 4)` pixels in both axes.
// 3.  **Sampling**: every `round(1 / scale)`-th template pixel (at least 1) is
//     compared against the source pixel it lands on. Confidence is the fraction
//     of sampled pixels whose foreground flag agrees.
// 4.  **Filtering**: matches below the template's sensitivity are dropped, and a
//     match whose centre lies within half a window of an already kept match in
//     both axes is a duplicate; the first one found wins.
// 5.  **Ranking**: survivors are sorted by descending confidence and capped.
//
// Cost is O(scales * positions * sampled pixels) per template. It trades recall
// for a bounded per-frame budget, so it should only carry a handful of small
// templates.

use crate::config::TemplateSpec;
use crate::core_modules::contour::BoundingBox;
use crate::core_modules::detection::{Detection, DetectionSource};
use crate::core_modules::frame::{Frame, Millis};
use crate::core_modules::pixel_mask::pixel_mask::PixelMask;
use crate::core_modules::preprocessor::preprocessor::threshold_frame;
use crate::core_modules::shape_classifier::Classification;
use crate::error::{Result, ShapeError};
use image::DynamicImage;
use log::{info, warn};

pub const MATCH_SCALES: [f64; 5] = [0.5, 0.75, 1.0, 1.25, 1.5];
pub const DEFAULT_TEMPLATE_THRESHOLD: f64 = 128.0;
pub const DEFAULT_MAX_MATCHES: usize = 3;
const MIN_STEP: u32 = 10;

/// A binarised reference image bound to a pattern id.
#[derive(Debug, Clone)]
pub struct ReferenceTemplate {
    pub pattern_id: String,
    pub mask: PixelMask,
    pub sensitivity: f64,
}

impl ReferenceTemplate {
    pub fn new(pattern_id: &str, mask: PixelMask, sensitivity: f64) -> Self {
        Self {
            pattern_id: pattern_id.to_string(),
            mask,
            sensitivity,
        }
    }

    /// Binarises `image` the same way frames are binarised.
    pub fn from_image(pattern_id: &str, image: &DynamicImage, threshold: f64, sensitivity: f64) -> Self {
        let frame = Frame::from_rgba_image(&image.to_rgba8(), 0);
        Self::new(pattern_id, threshold_frame(&frame, threshold), sensitivity)
    }

    /// Decodes the template image named by `spec`.
    pub fn load(spec: &TemplateSpec, threshold: f64) -> Result<Self> {
        let image = image::open(&spec.image).map_err(|source| ShapeError::TemplateImage {
            path: spec.image.clone(),
            source,
        })?;
        let template = Self::from_image(&spec.id, &image, threshold, spec.sensitivity);
        info!(
            "loaded template `{}` from {} ({}x{})",
            spec.id,
            spec.image.display(),
            template.mask.width(),
            template.mask.height()
        );
        Ok(template)
    }
}

#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    templates: Vec<ReferenceTemplate>,
    max_matches: usize,
}

impl TemplateMatcher {
    pub fn new(templates: Vec<ReferenceTemplate>) -> Self {
        Self {
            templates,
            max_matches: DEFAULT_MAX_MATCHES,
        }
    }

    /// Loads every template it can. One that fails to load is logged and left out.
    pub fn load_all(specs: &[TemplateSpec], threshold: f64) -> Self {
        let templates = specs
            .iter()
            .filter_map(|spec| match ReferenceTemplate::load(spec, threshold) {
                Ok(template) => Some(template),
                Err(err) => {
                    warn!("template `{}` unavailable: {}", spec.id, err);
                    None
                }
            })
            .collect();
        Self::new(templates)
    }

    pub fn push(&mut self, template: ReferenceTemplate) {
        self.templates.push(template);
    }

    pub fn templates(&self) -> &[ReferenceTemplate] {
        &self.templates
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Runs every template, containing each one's fault.
    pub fn match_all(&self, source: &PixelMask, timestamp: Millis) -> Classification {
        let mut classification = Classification::default();
        for template in &self.templates {
            classification.absorb_contained(&template.pattern_id, || {
                match_template(source, template, self.max_matches, timestamp)
            });
        }
        classification
    }
}

/// The best `max_matches` placements of `template` in `source`.
pub fn match_template(
    source: &PixelMask,
    template: &ReferenceTemplate,
    max_matches: usize,
    timestamp: Millis,
) -> Result<Vec<Detection>> {
    let mask = &template.mask;
    if mask.is_empty() || mask.foreground_count() == 0 {
        return Err(ShapeError::EmptyTemplate(template.pattern_id.clone()));
    }

    let mut matches: Vec<Detection> = Vec::new();
    for scale in MATCH_SCALES {
        let scaled_w = (mask.width() as f64 * scale).round() as u32;
        let scaled_h = (mask.height() as f64 * scale).round() as u32;
        if scaled_w == 0 || scaled_h == 0 || scaled_w > source.width() || scaled_h > source.height() {
            continue;
        }

        let step = MIN_STEP.max(scaled_w.min(scaled_h) / 4) as usize;
        let stride = ((1.0 / scale).round() as usize).max(1);

        for y in (0..=source.height() - scaled_h).step_by(step) {
            for x in (0..=source.width() - scaled_w).step_by(step) {
                let confidence = correlate(source, mask, x, y, scale, stride);
                if confidence < template.sensitivity {
                    continue;
                }

                let window = BoundingBox::new(x as f64, y as f64, scaled_w as f64, scaled_h as f64);
                if is_duplicate(&matches, &window) {
                    continue;
                }

                let mut detection = Detection::new(&template.pattern_id, window, confidence, timestamp);
                detection.source = DetectionSource::Template { scale };
                matches.push(detection);
            }
        }
    }

    matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    matches.truncate(max_matches);
    Ok(matches)
}

/// Fraction of sampled template pixels that agree with the source window at (x, y).
fn correlate(source: &PixelMask, mask: &PixelMask, x: u32, y: u32, scale: f64, stride: usize) -> f64 {
    let mut agree = 0usize;
    let mut sampled = 0usize;
    for ty in (0..mask.height()).step_by(stride) {
        let sy = y + (ty as f64 * scale).round() as u32;
        for tx in (0..mask.width()).step_by(stride) {
            let sx = x + (tx as f64 * scale).round() as u32;
            sampled += 1;
            if mask.get(tx, ty) == source.get(sx, sy) {
                agree += 1;
            }
        }
    }
    agree as f64 / sampled as f64
}

fn is_duplicate(kept: &[Detection], window: &BoundingBox) -> bool {
    let (cx, cy) = window.center();
    kept.iter().any(|existing| {
        let (ex, ey) = existing.center();
        (cx - ex).abs() < window.width / 2.0 && (cy - ey).abs() < window.height / 2.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn square_source() -> PixelMask {
        PixelMask::from_fn(100, 100, |x, y| (40..60).contains(&x) && (40..60).contains(&y))
    }

    fn solid_template(sensitivity: f64) -> ReferenceTemplate {
        ReferenceTemplate::new("marker", PixelMask::from_fn(20, 20, |_, _| true), sensitivity)
    }

    #[test]
    fn finds_the_square_and_caps_the_results() {
        let matches = match_template(&square_source(), &solid_template(0.9), DEFAULT_MAX_MATCHES, 7).unwrap();
        let square = BoundingBox::new(40.0, 40.0, 20.0, 20.0);

        assert_eq!(matches.len(), 3);
        for pair in matches.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        for detection in &matches {
            assert!(detection.confidence >= 0.9);
            assert!(square.contains(&detection.bounding_box), "{:?}", detection.bounding_box);
            assert_eq!(detection.timestamp, 7);
            assert!(matches!(detection.source, DetectionSource::Template { .. }));
        }
    }

    #[test]
    fn earlier_scales_suppress_overlapping_windows() {
        let source = PixelMask::from_fn(120, 100, |x, y| {
            ((20..40).contains(&x) || (80..100).contains(&x)) && (40..60).contains(&y)
        });
        let matches = match_template(&source, &solid_template(0.9), 100, 0).unwrap();

        // Four half-scale windows tile each square; every larger window overlaps one of them.
        assert_eq!(matches.len(), 8);
        for detection in &matches {
            assert_eq!(detection.source, DetectionSource::Template { scale: 0.5 });
            assert_eq!((detection.bounding_box.width, detection.bounding_box.height), (10.0, 10.0));
        }
        assert!(!matches.iter().any(|d| d.bounding_box == BoundingBox::new(20.0, 40.0, 20.0, 20.0)));

        for (i, a) in matches.iter().enumerate() {
            for b in &matches[i + 1..] {
                let ((ax, ay), (bx, by)) = (a.center(), b.center());
                let near = (ax - bx).abs() < b.bounding_box.width / 2.0 && (ay - by).abs() < b.bounding_box.height / 2.0;
                assert!(!near, "{:?} and {:?} overlap", a.bounding_box, b.bounding_box);
            }
        }

        let left = BoundingBox::new(20.0, 40.0, 20.0, 20.0);
        assert_eq!(matches.iter().filter(|d| left.contains(&d.bounding_box)).count(), 4);
    }

    #[test]
    fn oversized_template_matches_nothing() {
        let source = PixelMask::from_fn(8, 8, |_, _| true);
        let matches = match_template(&source, &solid_template(0.5), DEFAULT_MAX_MATCHES, 0).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn empty_template_faults_without_affecting_others() {
        let matcher = TemplateMatcher::new(vec![
            ReferenceTemplate::new("blank", PixelMask::new(20, 20), 0.5),
            solid_template(0.9),
        ]);
        let classification = matcher.match_all(&square_source(), 0);
        assert_eq!(classification.faulted, vec!["blank".to_string()]);
        assert!(!classification.detections.is_empty());
        assert!(classification.detections.iter().all(|d| d.pattern_id == "marker"));
    }

    #[test]
    fn image_templates_use_the_frame_threshold() {
        let image = RgbaImage::from_fn(4, 4, |x, _| if x < 2 { Rgba([200, 200, 200, 255]) } else { Rgba([50, 50, 50, 255]) });
        let template = ReferenceTemplate::from_image("img", &DynamicImage::ImageRgba8(image), DEFAULT_TEMPLATE_THRESHOLD, 0.8);
        assert_eq!(template.mask.foreground_count(), 8);
        assert!(template.mask.get(1, 3));
        assert!(!template.mask.get(2, 0));
    }
}
