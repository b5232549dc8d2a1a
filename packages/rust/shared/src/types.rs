//! Core domain types shared across the workspace.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LearnPathError, Result};

// ---------------------------------------------------------------------------
// GraphId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for graph session identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub Uuid);

impl GraphId {
    /// Generate a new time-sortable graph identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for GraphId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// LearnerId
// ---------------------------------------------------------------------------

/// Opaque learner/session key. Callers choose the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LearnerId(pub String);

impl LearnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LearnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LearnerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Concept labels
// ---------------------------------------------------------------------------

/// Normalize a concept label into its identity key.
///
/// Lowercases, trims, and collapses internal whitespace runs to one space,
/// so `"  Binary   Search "` and `"binary search"` name the same concept.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// WeightVector
// ---------------------------------------------------------------------------

/// Per-request weighting of the four edge cost dimensions.
///
/// A dimension missing from a request body defaults to `0.25`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    #[serde(default = "default_dimension_weight")]
    pub time: f64,
    #[serde(default = "default_dimension_weight")]
    pub cognitive: f64,
    #[serde(default = "default_dimension_weight")]
    pub prereq: f64,
    #[serde(default = "default_dimension_weight")]
    pub interest: f64,
}

fn default_dimension_weight() -> f64 {
    0.25
}

impl Default for WeightVector {
    /// The weighting the bundled frontend sends.
    fn default() -> Self {
        Self::new(0.3, 0.3, 0.2, 0.2)
    }
}

impl WeightVector {
    pub const fn new(time: f64, cognitive: f64, prereq: f64, interest: f64) -> Self {
        Self {
            time,
            cognitive,
            prereq,
            interest,
        }
    }

    pub fn sum(&self) -> f64 {
        self.time + self.cognitive + self.prereq + self.interest
    }

    /// Reject negative or non-finite components and an all-zero vector.
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("time", self.time),
            ("cognitive", self.cognitive),
            ("prereq", self.prereq),
            ("interest", self.interest),
        ];
        for (name, value) in dims {
            if !value.is_finite() {
                return Err(LearnPathError::invalid_weights(format!(
                    "{name} must be a finite number"
                )));
            }
            if value < 0.0 {
                return Err(LearnPathError::invalid_weights(format!(
                    "{name} must not be negative"
                )));
            }
        }
        if self.sum() <= 0.0 {
            return Err(LearnPathError::invalid_weights(
                "weights must sum to a positive value",
            ));
        }
        Ok(())
    }

    /// Parse a `time,cognitive,prereq,interest` list (CLI form).
    pub fn parse_csv(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| {
                p.trim().parse::<f64>().map_err(|e| {
                    LearnPathError::invalid_weights(format!("'{}' is not a number: {e}", p.trim()))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        match parts.as_slice() {
            [time, cognitive, prereq, interest] => {
                let weights = Self::new(*time, *cognitive, *prereq, *interest);
                weights.validate()?;
                Ok(weights)
            }
            _ => Err(LearnPathError::invalid_weights(format!(
                "expected 4 comma-separated values, got {}",
                parts.len()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// IngestWarning
// ---------------------------------------------------------------------------

/// A URL that was skipped during ingestion, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestWarning {
    pub url: String,
    pub message: String,
}

impl IngestWarning {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_id_roundtrip() {
        let id = GraphId::new();
        let parsed: GraphId = id.to_string().parse().expect("parse GraphId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn normalize_collapses_case_and_whitespace() {
        assert_eq!(normalize_label("  Binary   Search "), "binary search");
        assert_eq!(normalize_label("RECURSION"), normalize_label("recursion"));
        assert_eq!(normalize_label("   "), "");
    }

    #[test]
    fn missing_weight_dimensions_default_to_quarter() {
        let weights: WeightVector = serde_json::from_str(r#"{"time": 1.0}"#).expect("parse");
        assert_eq!(weights.time, 1.0);
        assert_eq!(weights.cognitive, 0.25);
        assert_eq!(weights.prereq, 0.25);
        assert_eq!(weights.interest, 0.25);
    }

    #[test]
    fn zero_sum_weights_rejected() {
        let err = WeightVector::new(0.0, 0.0, 0.0, 0.0)
            .validate()
            .expect_err("zero sum must fail");
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn negative_and_nan_weights_rejected() {
        assert!(WeightVector::new(-0.1, 0.5, 0.3, 0.3).validate().is_err());
        assert!(WeightVector::new(f64::NAN, 0.5, 0.3, 0.3).validate().is_err());
        assert!(WeightVector::default().validate().is_ok());
    }

    #[test]
    fn parse_csv_weights() {
        let weights = WeightVector::parse_csv("0.3, 0.3, 0.2, 0.2").expect("parse");
        assert_eq!(weights, WeightVector::default());
        assert!(WeightVector::parse_csv("1,2,3").is_err());
        assert!(WeightVector::parse_csv("a,b,c,d").is_err());
    }
}
