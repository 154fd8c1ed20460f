//! Privacy parameters for a synthesis run.

use margsynth_core::{Result, SynthError};

/// Total privacy budget and query sensitivity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrivacyParams {
    /// Total epsilon.
    pub epsilon: f64,
    /// Total delta.
    pub delta: f64,
    /// Sensitivity of each marginal count query.
    pub sensitivity: f64,
}

impl PrivacyParams {
    /// Create validated privacy parameters.
    pub fn new(epsilon: f64, delta: f64, sensitivity: f64) -> Result<Self> {
        let params = Self {
            epsilon,
            delta,
            sensitivity,
        };
        params.validate()?;
        Ok(params)
    }

    /// Validate parameters.
    pub fn validate(&self) -> Result<()> {
        validate_budget(self.epsilon, self.delta)?;
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(SynthError::invalid("sensitivity must be positive and finite"));
        }
        Ok(())
    }

    /// Parameters with epsilon and delta scaled by `fraction`.
    pub fn share(&self, fraction: f64) -> Result<Self> {
        Self::new(
            self.epsilon * fraction,
            self.delta * fraction,
            self.sensitivity,
        )
    }
}

pub(crate) fn validate_budget(epsilon: f64, delta: f64) -> Result<()> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(SynthError::invalid("epsilon must be positive and finite"));
    }
    if !delta.is_finite() || delta <= 0.0 || delta >= 1.0 {
        return Err(SynthError::invalid("delta must be in (0, 1)"));
    }
    Ok(())
}
