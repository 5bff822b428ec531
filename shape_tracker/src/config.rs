// THEORY:
// Every tunable number of the engine lives here, grouped by the stage that reads
// it. The whole tree deserialises from TOML with every field defaulted, so an
// empty file is the built-in configuration and a file only has to mention what
// it changes. `validate` is the single gate between a config and a running
// session: once `ShapePipeline::new` accepts it, nothing downstream re-checks.

use crate::core_modules::contour_extractor::contour_extractor::DEFAULT_MIN_CONTOUR_PIXELS;
use crate::core_modules::frame::Millis;
use crate::core_modules::preprocessor::preprocessor::DEFAULT_CONTRAST_THRESHOLD;
use crate::core_modules::shape_classifier::AreaGate;
use crate::core_modules::shape_pattern::{AspectProfile, DisplayMetadata, ScoringWeights, ShapeKind, ShapePattern};
use crate::core_modules::template_matcher::DEFAULT_TEMPLATE_THRESHOLD;
use crate::error::{Result, ShapeError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_TEMPLATE_SENSITIVITY: f64 = 0.8;
const FALLBACK_COLOR: &str = "#ffffff";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub contrast_threshold: f64,
    pub template_threshold: f64,
    pub min_contour_pixels: usize,
    pub area_min_size: usize,
    pub area_max_size: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            contrast_threshold: DEFAULT_CONTRAST_THRESHOLD,
            template_threshold: DEFAULT_TEMPLATE_THRESHOLD,
            min_contour_pixels: DEFAULT_MIN_CONTOUR_PIXELS,
            area_min_size: 1000,
            area_max_size: 50000,
        }
    }
}

impl DetectorConfig {
    pub fn area_gate(&self) -> AreaGate {
        AreaGate {
            min: self.area_min_size,
            max: self.area_max_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Max centre distance (px) for a detection to continue a shape.
    pub tracking_tolerance: f64,
    /// EMA weight of the new measurement.
    pub smoothing_factor: f64,
    /// Share of the old confidence kept on each match.
    pub confidence_retention: f64,
    pub stable_after_frames: u32,
    pub max_age_ms: Millis,
    pub history_capacity: usize,
    pub velocity_window: usize,
    pub prediction_horizon_ms: f64,
    pub confidence_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracking_tolerance: 50.0,
            smoothing_factor: 0.7,
            confidence_retention: 0.9,
            stable_after_frames: 5,
            max_age_ms: 1000,
            history_capacity: 10,
            velocity_window: 3,
            prediction_horizon_ms: 50.0,
            confidence_threshold: 0.7,
        }
    }
}

/// A pattern as written in the config file. Missing parts come from the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub id: String,
    pub kind: ShapeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<ScoringWeights>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<AspectProfile>,
}

impl PatternSpec {
    pub fn into_pattern(self) -> ShapePattern {
        let display = self
            .display
            .unwrap_or_else(|| DisplayMetadata::new(&self.id, &self.id, FALLBACK_COLOR, ""));
        let mut pattern = ShapePattern::new(&self.id, self.kind, display);
        if let Some(sensitivity) = self.sensitivity {
            pattern.sensitivity = sensitivity;
        }
        if let Some(weights) = self.weights {
            pattern.weights = weights;
        }
        if let Some(aspect) = self.aspect {
            pattern.aspect = aspect;
        }
        pattern
    }

    fn effective_sensitivity(&self) -> f64 {
        self.sensitivity.unwrap_or_else(|| self.kind.default_sensitivity())
    }
}

impl From<&ShapePattern> for PatternSpec {
    fn from(pattern: &ShapePattern) -> Self {
        Self {
            id: pattern.id.clone(),
            kind: pattern.kind,
            sensitivity: Some(pattern.sensitivity),
            display: Some(pattern.display.clone()),
            weights: Some(pattern.weights),
            aspect: Some(pattern.aspect),
        }
    }
}

/// A reference image to match against every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub id: String,
    /// Relative paths resolve against the config file's directory.
    pub image: PathBuf,
    #[serde(default = "default_template_sensitivity")]
    pub sensitivity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayMetadata>,
}

fn default_template_sensitivity() -> f64 {
    DEFAULT_TEMPLATE_SENSITIVITY
}

impl TemplateSpec {
    pub fn display_or_default(&self) -> DisplayMetadata {
        self.display
            .clone()
            .unwrap_or_else(|| DisplayMetadata::new(&self.id, &self.id, FALLBACK_COLOR, ""))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub patterns: Vec<PatternSpec>,
    pub templates: Vec<TemplateSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            tracker: TrackerConfig::default(),
            patterns: ShapePattern::builtin().iter().map(PatternSpec::from).collect(),
            templates: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ShapeError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.rebase_paths(path);
        Ok(config)
    }

    fn rebase_paths(&mut self, path: &Path) {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for template in &mut self.templates {
            if template.image.is_relative() {
                template.image = base.join(&template.image);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let tracker = &self.tracker;
        if !(tracker.smoothing_factor > 0.0 && tracker.smoothing_factor <= 1.0) {
            return invalid(format!("smoothing_factor {} is outside (0, 1]", tracker.smoothing_factor));
        }
        if !(0.0..=1.0).contains(&tracker.confidence_retention) {
            return invalid(format!("confidence_retention {} is outside [0, 1]", tracker.confidence_retention));
        }
        if tracker.history_capacity < 2 {
            return invalid(format!("history_capacity must be at least 2, got {}", tracker.history_capacity));
        }
        if tracker.velocity_window < 2 {
            return invalid(format!("velocity_window must be at least 2, got {}", tracker.velocity_window));
        }

        let detector = &self.detector;
        if detector.area_min_size > detector.area_max_size {
            return invalid(format!(
                "area_min_size {} exceeds area_max_size {}",
                detector.area_min_size, detector.area_max_size
            ));
        }

        let mut ids = HashSet::new();
        let sensitivities = self
            .patterns
            .iter()
            .map(|p| (&p.id, p.effective_sensitivity()))
            .chain(self.templates.iter().map(|t| (&t.id, t.sensitivity)));
        for (id, sensitivity) in sensitivities {
            if !(0.0..=1.0).contains(&sensitivity) {
                return invalid(format!("sensitivity {} of `{}` is outside [0, 1]", sensitivity, id));
            }
            if !ids.insert(id.as_str()) {
                return Err(ShapeError::DuplicatePattern(id.clone()));
            }
        }
        Ok(())
    }

    pub fn shape_patterns(&self) -> Vec<ShapePattern> {
        self.patterns.iter().cloned().map(PatternSpec::into_pattern).collect()
    }
}

fn invalid(message: String) -> Result<()> {
    Err(ShapeError::InvalidConfig(message))
}
