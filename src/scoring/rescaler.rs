use serde::{Deserialize, Serialize};

use crate::error::ScoringError;

pub const DEFAULT_SCORE_RANGE: (f64, f64) = (0.0, 1000.0);

/// Linear min-max map from anomaly measures onto the score range.
///
/// Only the two bounds observed at fit time and the target range are kept, so
/// the exact mapping can be reapplied to measures from a later batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedRescaler {
    pub data_min: f64,
    pub data_max: f64,
    pub feature_range: (f64, f64),
    /// Clamp transformed values into `feature_range`. Only matters for
    /// measures outside the fitted bounds.
    #[serde(default = "default_clip")]
    pub clip: bool,
}

fn default_clip() -> bool {
    true
}

fn check_range((lo, hi): (f64, f64)) -> Result<(), ScoringError> {
    if lo.is_finite() && hi.is_finite() && lo < hi {
        Ok(())
    } else {
        Err(ScoringError::InvalidConfig(format!(
            "score range ({}, {}) must be finite and increasing",
            lo, hi
        )))
    }
}

impl FittedRescaler {
    /// Fit on one batch of measures.
    pub fn fit(values: &[f64], feature_range: (f64, f64)) -> Result<Self, ScoringError> {
        check_range(feature_range)?;
        if values.is_empty() {
            return Err(ScoringError::EmptyBatch);
        }

        let data_min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let data_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            data_min,
            data_max,
            feature_range,
            clip: true,
        })
    }

    /// Reject bounds that cannot have come from `fit`. Needed for rescalers
    /// built by hand or loaded from disk.
    pub fn validate(&self) -> Result<(), ScoringError> {
        check_range(self.feature_range)?;
        if !(self.data_min.is_finite() && self.data_max.is_finite()) {
            return Err(ScoringError::InvalidConfig(format!(
                "rescaler bounds ({}, {}) must be finite",
                self.data_min, self.data_max
            )));
        }
        if self.data_min > self.data_max {
            return Err(ScoringError::InvalidConfig(format!(
                "rescaler data_min {} exceeds data_max {}",
                self.data_min, self.data_max
            )));
        }
        Ok(())
    }

    /// Width of the fitted bounds. A zero-width fit counts as width 1, so a
    /// measure equal to the bound maps to the range start.
    fn data_width(&self) -> f64 {
        let width = self.data_max - self.data_min;
        if width == 0.0 {
            1.0
        } else {
            width
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        let (lo, hi) = self.feature_range;
        let scaled = lo + (value - self.data_min) / self.data_width() * (hi - lo);
        if self.clip {
            scaled.clamp(lo, hi)
        } else {
            scaled
        }
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| self.transform(*v)).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse and validate a persisted rescaler.
    pub fn from_json(json: &str) -> Result<Self, ScoringError> {
        let rescaler: Self = serde_json::from_str(json)
            .map_err(|e| ScoringError::InvalidConfig(format!("rescaler JSON: {}", e)))?;
        rescaler.validate()?;
        Ok(rescaler)
    }
}
