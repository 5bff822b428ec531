// Per-frame stages first, then the stateful tracking layer.

pub mod pixel;
pub mod frame;
pub mod pixel_mask;
pub mod preprocessor;
pub mod contour;
pub mod contour_extractor;
pub mod shape_pattern;
pub mod detection;
pub mod shape_classifier;
pub mod template_matcher;
pub mod motion_history;
pub mod tracker;
