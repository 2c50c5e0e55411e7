//! Threshold-based similarity decisions over face descriptors.
//!
//! Lower distance = more similar. A pair matches only when the distance is
//! strictly below the threshold; a distance equal to the threshold is a
//! non-match.

use crate::config::{env_f32, ConfigError};
use crate::descriptor::Descriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default threshold for attendance marking.
pub const DEFAULT_LENIENT_THRESHOLD: f32 = 0.6;
/// Default threshold for direct image comparison.
pub const DEFAULT_STRICT_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecisionError {
    /// Upstream handed over vectors of different lengths. This is a contract
    /// violation by the recognition step, not a runtime condition.
    #[error("descriptor length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
}

/// Outcome of comparing one distance against one threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub distance: f32,
    pub threshold: f32,
    pub is_match: bool,
}

/// Euclidean distance between two equal-length vectors.
pub fn distance(a: &[f32], b: &[f32]) -> Result<f32, DecisionError> {
    if a.len() != b.len() {
        return Err(DecisionError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt())
}

/// Apply `threshold` to `distance`.
pub fn decide(distance: f32, threshold: f32) -> MatchResult {
    MatchResult {
        distance,
        threshold,
        is_match: distance < threshold,
    }
}

/// Which side of a comparison had no detectable face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Probe,
    Reference,
}

/// Result of a comparison request, including the no-face outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    NoFaceDetected { side: Side },
    Compared(MatchResult),
}

impl Verdict {
    /// `NoFaceDetected` is always a non-match.
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Compared(r) if r.is_match)
    }
}

/// Compare two optional descriptors. Absent descriptors never reach the
/// distance computation. The reference side is checked first.
pub fn compare(
    probe: Option<&Descriptor>,
    reference: Option<&Descriptor>,
    threshold: f32,
) -> Result<Verdict, DecisionError> {
    let Some(reference) = reference else {
        return Ok(Verdict::NoFaceDetected {
            side: Side::Reference,
        });
    };
    let Some(probe) = probe else {
        return Ok(Verdict::NoFaceDetected { side: Side::Probe });
    };
    let d = distance(probe.as_slice(), reference.as_slice())?;
    Ok(Verdict::Compared(decide(d, threshold)))
}

/// Threshold selection for the two decision policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdPolicy {
    /// Used for attendance marking.
    pub lenient: f32,
    /// Used for direct comparison.
    pub strict: f32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            lenient: DEFAULT_LENIENT_THRESHOLD,
            strict: DEFAULT_STRICT_THRESHOLD,
        }
    }
}

impl ThresholdPolicy {
    const ENV_LENIENT: &'static str = "FACEMARK_LENIENT_THRESHOLD";
    const ENV_STRICT: &'static str = "FACEMARK_STRICT_THRESHOLD";

    /// Load `FACEMARK_*_THRESHOLD` overrides on top of `base`.
    pub fn from_env_over(base: Self) -> Result<Self, ConfigError> {
        let policy = Self {
            lenient: env_f32(Self::ENV_LENIENT, base.lenient)?,
            strict: env_f32(Self::ENV_STRICT, base.strict)?,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_over(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("lenient", self.lenient), ("strict", self.strict)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: name.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}
