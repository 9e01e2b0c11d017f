//! Ranked prediction results

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::catalog::{ClassCatalog, LeafDisease};
use crate::engine::RawScores;
use crate::InferenceError;

/// Round a percentage to 2 decimal places
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-class percentages in catalog order. Serializes as an `{id: pct}` map.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassBreakdown(Vec<(LeafDisease, f64)>);

impl ClassBreakdown {
    /// Percentage for one class
    pub fn get(&self, class: LeafDisease) -> Option<f64> {
        self.0.iter().find(|(c, _)| *c == class).map(|(_, p)| *p)
    }

    /// Entries in catalog order
    pub fn iter(&self) -> impl Iterator<Item = (LeafDisease, f64)> + '_ {
        self.0.iter().copied()
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the breakdown is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ClassBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (class, pct) in &self.0 {
            map.serialize_entry(class.as_str(), pct)?;
        }
        map.end()
    }
}

/// Classification result for one image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Top class
    pub class: LeafDisease,
    /// Localized label of the top class
    #[serde(rename = "classVi")]
    pub class_vi: &'static str,
    /// Top score as a percentage, 2 decimals
    pub confidence: f64,
    /// Every class's percentage, each rounded independently
    #[serde(rename = "allPredictions")]
    pub all_predictions: ClassBreakdown,
}

/// Maps raw score vectors onto the class catalog
#[derive(Debug, Clone, Default)]
pub struct ResultFormatter {
    catalog: ClassCatalog,
}

impl ResultFormatter {
    /// Create a formatter for the given catalog
    pub fn new(catalog: ClassCatalog) -> Self {
        Self { catalog }
    }

    /// Catalog used for lookups
    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// Build the ranked result
    pub fn format(&self, scores: &RawScores) -> Result<PredictionResult, InferenceError> {
        let mismatch = || InferenceError::UnknownClass {
            outputs: scores.len(),
            classes: self.catalog.len(),
        };

        if scores.len() != self.catalog.len() {
            return Err(mismatch());
        }

        let (top_index, top_score) = scores.argmax().ok_or_else(mismatch)?;
        let class = self.catalog.get(top_index).ok_or_else(mismatch)?;

        let all_predictions = ClassBreakdown(
            self.catalog
                .iter()
                .zip(scores.as_slice())
                .map(|(c, s)| (c, round2(*s as f64 * 100.0)))
                .collect(),
        );

        Ok(PredictionResult {
            class,
            class_vi: class.label_vi(),
            confidence: round2(top_score as f64 * 100.0),
            all_predictions,
        })
    }
}
