// THEORY:
// A `ShapePattern` is one entry of the closed set of shapes the engine can
// recognise. It is configuration, not state: loaded once when the session is
// built and never touched again while frames flow.
//
// A pattern carries three things:
// 1.  **Identity and display**: the id that detections and tracked shapes refer
//     back to, and the metadata a renderer needs (name, label, colour, emoji).
// 2.  **Scoring recipe**: which `ShapeKind` scorer to run plus the weights that
//     fold its sub-scores into one confidence and the ideal aspect ratio.
// 3.  **Acceptance threshold** (`sensitivity`): the minimum confidence for a
//     detection to be emitted.
//
// The `ShapeRegistry` keeps patterns in registration order (classification and
// detection order follow it) and answers display lookups by id for patterns and
// reference templates alike.

use crate::error::{Result, ShapeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The scorer family a pattern uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    LShape,
    TShape,
    Cross,
}

/// What a renderer shows for a tracked shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMetadata {
    pub name: String,
    pub label: String,
    /// `#rrggbb`.
    pub color: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

impl DisplayMetadata {
    pub fn new(name: &str, label: &str, color: &str, emoji: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            color: color.to_string(),
            emoji: emoji.to_string(),
            subtitle: None,
        }
    }
}

/// Weights applied to the four sub-scores. They are expected to sum to 1.0 but
/// the final confidence is clamped either way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub structure: f64,
    pub rectangularity: f64,
    pub symmetry: f64,
    pub aspect: f64,
}

/// Ideal aspect ratio and how far from it the aspect score reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectProfile {
    pub ideal: f64,
    pub tolerance: f64,
}

impl AspectProfile {
    /// `max(0, 1 - |ratio - ideal| / tolerance)`.
    pub fn score(&self, ratio: f64) -> f64 {
        (1.0 - (ratio - self.ideal).abs() / self.tolerance).max(0.0)
    }
}

impl ShapeKind {
    pub fn default_weights(&self) -> ScoringWeights {
        match self {
            ShapeKind::LShape => ScoringWeights {
                structure: 0.5,
                rectangularity: 0.3,
                symmetry: 0.0,
                aspect: 0.2,
            },
            ShapeKind::TShape => ScoringWeights {
                structure: 0.6,
                rectangularity: 0.0,
                symmetry: 0.2,
                aspect: 0.2,
            },
            ShapeKind::Cross => ScoringWeights {
                structure: 0.6,
                rectangularity: 0.0,
                symmetry: 0.3,
                aspect: 0.1,
            },
        }
    }

    pub fn default_aspect(&self) -> AspectProfile {
        match self {
            // An L may lie either way, hence the wide tolerance.
            ShapeKind::LShape => AspectProfile {
                ideal: 0.5,
                tolerance: 2.0,
            },
            ShapeKind::TShape => AspectProfile {
                ideal: 0.8,
                tolerance: 1.5,
            },
            ShapeKind::Cross => AspectProfile {
                ideal: 0.8,
                tolerance: 1.2,
            },
        }
    }

    pub fn default_sensitivity(&self) -> f64 {
        match self {
            ShapeKind::LShape => 0.6,
            ShapeKind::TShape => 0.7,
            ShapeKind::Cross => 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapePattern {
    pub id: String,
    pub kind: ShapeKind,
    pub display: DisplayMetadata,
    pub sensitivity: f64,
    pub weights: ScoringWeights,
    pub aspect: AspectProfile,
}

impl ShapePattern {
    /// A pattern with the kind's default recipe.
    pub fn new(id: &str, kind: ShapeKind, display: DisplayMetadata) -> Self {
        Self {
            id: id.to_string(),
            kind,
            display,
            sensitivity: kind.default_sensitivity(),
            weights: kind.default_weights(),
            aspect: kind.default_aspect(),
        }
    }

    pub fn l_shape() -> Self {
        Self::new(
            "forma_L",
            ShapeKind::LShape,
            DisplayMetadata::new("Forma L", "Forma L detectada", "#e74c3c", "🔲"),
        )
    }

    pub fn t_shape() -> Self {
        Self::new(
            "forma_T",
            ShapeKind::TShape,
            DisplayMetadata::new("Forma T", "Forma T detectada", "#3498db", "🔳"),
        )
    }

    pub fn cross() -> Self {
        Self::new(
            "forma_cruz",
            ShapeKind::Cross,
            DisplayMetadata::new("Cruz", "Cruz detectada", "#2ecc71", "✚"),
        )
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::l_shape(), Self::t_shape(), Self::cross()]
    }
}

/// Read-only lookup of every pattern and template known to a session.
#[derive(Debug, Clone, Default)]
pub struct ShapeRegistry {
    patterns: Vec<ShapePattern>,
    display: HashMap<String, DisplayMetadata>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pattern: ShapePattern) -> Result<()> {
        self.register_display(&pattern.id, pattern.display.clone())?;
        self.patterns.push(pattern);
        Ok(())
    }

    /// Registers display metadata for an id that is scored elsewhere (a reference template).
    pub fn register_display(&mut self, id: &str, display: DisplayMetadata) -> Result<()> {
        if self.display.contains_key(id) {
            return Err(ShapeError::DuplicatePattern(id.to_string()));
        }
        self.display.insert(id.to_string(), display);
        Ok(())
    }

    pub fn patterns(&self) -> &[ShapePattern] {
        &self.patterns
    }

    pub fn display(&self, id: &str) -> Option<&DisplayMetadata> {
        self.display.get(id)
    }

    pub fn len(&self) -> usize {
        self.display.len()
    }

    pub fn is_empty(&self) -> bool {
        self.display.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_score_falls_off_linearly() {
        let profile = AspectProfile {
            ideal: 1.0,
            tolerance: 0.5,
        };
        assert_eq!(profile.score(1.0), 1.0);
        assert!((profile.score(1.25) - 0.5).abs() < 1e-12);
        assert_eq!(profile.score(2.0), 0.0);
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let mut registry = ShapeRegistry::new();
        for pattern in ShapePattern::builtin() {
            registry.register(pattern).unwrap();
        }
        assert_eq!(registry.patterns().len(), 3);
        assert!(matches!(
            registry.register(ShapePattern::cross()),
            Err(ShapeError::DuplicatePattern(id)) if id == "forma_cruz"
        ));
        assert_eq!(registry.display("forma_T").map(|d| d.color.as_str()), Some("#3498db"));
    }
}
