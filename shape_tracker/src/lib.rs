// THEORY:
// This file is the main entry point for the `shape_tracker` library crate.
// It defines the public API exposed to external consumers: a frame source on one
// side and an overlay renderer on the other.
//
// The primary goal is to export `ShapePipeline` (and its async sibling
// `ParallelPipeline`) together with `PipelineConfig` and the `FrameReport` they
// produce as the high-level interface of the engine. The individual stages in
// `core_modules` stay public so each one can be driven and tested on its own,
// but a consumer only ever needs the facade.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{DetectorConfig, PatternSpec, PipelineConfig, TemplateSpec, TrackerConfig};
pub use core_modules::frame::{Frame, Millis, PixelFormat};
pub use error::{Result, ShapeError};
pub use parallel_pipeline::{ParallelPipeline, spawn_frame_stream};
pub use pipeline::{FrameReport, ShapeOverlay, ShapePipeline};
