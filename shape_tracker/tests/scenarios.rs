mod common;

use common::{jittered_plus_sequence, plus_frame, solid_square_frame};
use shape_tracker::core_modules::contour::BoundingBox;
use shape_tracker::core_modules::contour_extractor::contour_extractor::find_contours;
use shape_tracker::core_modules::pixel_mask::pixel_mask::PixelMask;
use shape_tracker::core_modules::preprocessor::preprocessor::{DEFAULT_CONTRAST_THRESHOLD, threshold_frame};
use shape_tracker::core_modules::shape_pattern::DisplayMetadata;
use shape_tracker::core_modules::template_matcher::ReferenceTemplate;
use shape_tracker::{Frame, PipelineConfig, ShapePipeline};

#[test]
fn solid_square_yields_exactly_one_contour() {
    let mask = threshold_frame(&solid_square_frame(0), DEFAULT_CONTRAST_THRESHOLD);
    let contours = find_contours(&mask, 20);

    assert_eq!(contours.len(), 1);
    assert_eq!(contours[0].area, 900);
    assert_eq!(contours[0].bounding_box, BoundingBox::new(10.0, 10.0, 30.0, 30.0));
    assert_eq!(contours[0].aspect_ratio, 1.0);
}

#[test]
fn preprocessing_is_idempotent() {
    let frame = plus_frame(20, 25, 0);
    let first = threshold_frame(&frame, DEFAULT_CONTRAST_THRESHOLD);
    let second = threshold_frame(&frame, DEFAULT_CONTRAST_THRESHOLD);
    assert_eq!(first, second);
}

#[test]
fn malformed_and_empty_frames_produce_nothing() {
    let mut pipeline = ShapePipeline::new(PipelineConfig::default()).unwrap();

    let truncated = Frame::rgba(50, 50, vec![255; 100], 0);
    let report = pipeline.process_frame(&truncated);
    assert_eq!(report.contour_count, 0);
    assert_eq!(report.detection_count, 0);

    let empty = Frame::rgba(0, 0, Vec::new(), 33);
    let report = pipeline.process_frame(&empty);
    assert_eq!(report.contour_count, 0);
    assert!(report.overlays.is_empty());
    assert!(report.faulted_patterns.is_empty());
}

#[test]
fn cross_overlay_appears_once_the_shape_is_stable() {
    let mut pipeline = ShapePipeline::new(PipelineConfig::default()).unwrap();
    let reports: Vec<_> = jittered_plus_sequence()
        .iter()
        .map(|frame| pipeline.process_frame(frame))
        .collect();

    for report in &reports[..4] {
        assert!(report.overlays.iter().all(|o| o.pattern_id != "forma_cruz"));
    }
    for report in &reports[4..] {
        let crosses: Vec<_> = report.overlays.iter().filter(|o| o.pattern_id == "forma_cruz").collect();
        assert_eq!(crosses.len(), 1);

        let overlay = crosses[0];
        assert_eq!(overlay.display.as_ref().map(|d| d.color.as_str()), Some("#2ecc71"));
        assert!((overlay.bounding_box.x - 30.0).abs() < 5.0);
        assert!((overlay.bounding_box.y - 30.0).abs() < 5.0);
        assert!(overlay.confidence > 0.7);
    }

    let ids: Vec<u64> = reports[4..]
        .iter()
        .flat_map(|r| r.overlays.iter().filter(|o| o.pattern_id == "forma_cruz").map(|o| o.id))
        .collect();
    assert_eq!(ids[0], ids[1]);
}

#[test]
fn a_broken_template_does_not_suppress_shape_detection() {
    let blank = ReferenceTemplate::new("blank", PixelMask::new(12, 12), 0.5);
    let mut pipeline = ShapePipeline::new(PipelineConfig::default())
        .unwrap()
        .with_template(blank, DisplayMetadata::new("Blank", "Blank", "#000000", ""))
        .unwrap();

    let report = pipeline.process_frame(&plus_frame(30, 30, 0));
    assert_eq!(report.faulted_patterns, vec!["blank".to_string()]);
    assert!(pipeline.detect(&plus_frame(30, 30, 33)).iter().any(|d| d.pattern_id == "forma_cruz"));
}

#[test]
fn shapes_expire_after_the_max_age() {
    let mut pipeline = ShapePipeline::new(PipelineConfig::default()).unwrap();
    pipeline.process_frame(&plus_frame(30, 30, 0));
    assert!(pipeline.tracked_shapes().any(|s| s.pattern_id == "forma_cruz"));

    let blank = Frame::rgba(120, 120, vec![0; 120 * 120 * 4], 999);
    pipeline.process_frame(&blank);
    assert!(pipeline.tracked_shapes().any(|s| s.pattern_id == "forma_cruz"));

    let blank = Frame::rgba(120, 120, vec![0; 120 * 120 * 4], 1001);
    pipeline.process_frame(&blank);
    assert_eq!(pipeline.tracked_shapes().count(), 0);
}
