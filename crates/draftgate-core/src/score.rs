//! Quality scores and the acceptance threshold.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Normalized oracle score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct QualityScore(f64);

impl QualityScore {
    /// Score recorded when the oracle could not produce a reading.
    pub const ZERO: Self = Self(0.0);

    pub fn from_fraction(value: f64) -> Option<Self> {
        (value.is_finite() && (0.0..=1.0).contains(&value)).then_some(Self(value))
    }

    /// Convert an oracle percentage (`0..=100`).
    pub fn from_percentage(percent: f64) -> Option<Self> {
        (percent.is_finite() && (0.0..=100.0).contains(&percent)).then(|| Self(percent / 100.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for QualityScore {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_fraction(value).ok_or_else(|| format!("score {value} is outside [0, 1]"))
    }
}

impl From<QualityScore> for f64 {
    fn from(score: QualityScore) -> Self {
        score.0
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Minimum acceptable score for a run.
///
/// Immutable once built: there is no setter, and success is decided only by
/// [`Threshold::is_met_by`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Threshold(f64);

impl Threshold {
    pub const DEFAULT: Self = Self(0.9);

    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(ConfigError::Threshold(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_met_by(self, score: QualityScore) -> bool {
        score.value() >= self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<f64> for Threshold {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Threshold> for f64 {
    fn from(threshold: Threshold) -> Self {
        threshold.0
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
