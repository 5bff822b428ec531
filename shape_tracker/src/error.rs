// THEORY:
// A single error type for the whole engine. Almost nothing in the per-frame path
// is allowed to surface an error to the caller: a fault inside one shape pattern
// is contained at that pattern's boundary, logged, and the frame continues. The
// variants below are therefore split in two groups:
// - setup errors (config, template images) that `ShapePipeline::new` returns;
// - per-pattern faults (empty template, degenerate contour, non-finite score,
//   panic) that the classifier and matcher produce and the pipeline swallows.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShapeError>;

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("failed to read config file {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to load template image {}: {source}", path.display())]
    TemplateImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("template `{0}` has an empty mask")]
    EmptyTemplate(String),

    #[error("contour at ({x}, {y}) has a degenerate bounding box")]
    DegenerateContour { x: f64, y: f64 },

    #[error("pattern `{pattern}` produced a non-finite score")]
    NonFiniteScore { pattern: String },

    #[error("pattern `{0}` panicked while scoring")]
    PatternPanicked(String),

    #[error("pattern `{0}` is already registered")]
    DuplicatePattern(String),
}
