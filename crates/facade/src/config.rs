//! Run configuration for the synthesis pipeline.

use margsynth_accounting::AllocationPolicy;
use margsynth_core::{Result, RoundingMode, SynthError};
use margsynth_engine::{
    Initialization, ReconcilerConfig, RefineConfig, SplitSchedule, SynthesizerConfig,
};

/// Knobs of a synthesis run. The privacy budget itself is passed to
/// [`crate::Orchestrator::synthesize`].
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisConfig {
    /// Update iterations per stratum.
    pub update_iterations: usize,
    /// Rounding of fractional record amounts.
    pub rounding: RoundingMode,
    /// Weight of the public marginal when blending with its noisy counterpart.
    pub public_weight: f64,
    /// Stratum record counts are rounded to a multiple of this.
    pub stratum_granularity: usize,
    /// How each stratum's record pool is seeded.
    pub initialization: Initialization,
    /// Reconciler settings. Normalization is driven by the pipeline.
    pub reconciler: ReconcilerConfig,
    /// Optional keep/reserve refinement after synthesis.
    pub refine: Option<RefineConfig>,
    /// Master seed for measurement noise and synthesis.
    pub seed: u64,
    /// Budget split across marginal groups.
    pub policy: AllocationPolicy,
    /// Complete/partial replacement schedule.
    pub split: SplitSchedule,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            update_iterations: 60,
            rounding: RoundingMode::Deterministic,
            public_weight: 0.0,
            stratum_granularity: 1,
            initialization: Initialization::Random,
            reconciler: ReconcilerConfig::default(),
            refine: None,
            seed: 0,
            policy: AllocationPolicy::default(),
            split: SplitSchedule::default(),
        }
    }
}

impl SynthesisConfig {
    /// Set the update iterations.
    pub fn with_update_iterations(mut self, iterations: usize) -> Self {
        self.update_iterations = iterations;
        self
    }

    /// Set the rounding mode.
    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    /// Set the rounding mode by name, e.g. `"stochastic"`.
    pub fn with_rounding_name(self, name: &str) -> Result<Self> {
        Ok(self.with_rounding(name.parse()?))
    }

    /// Set the public/private blending weight.
    pub fn with_public_weight(mut self, weight: f64) -> Self {
        self.public_weight = weight;
        self
    }

    /// Set the stratum record-count granularity.
    pub fn with_stratum_granularity(mut self, granularity: usize) -> Self {
        self.stratum_granularity = granularity;
        self
    }

    /// Set the pool initialization.
    pub fn with_initialization(mut self, initialization: Initialization) -> Self {
        self.initialization = initialization;
        self
    }

    /// Set reconciler settings.
    pub fn with_reconciler(mut self, reconciler: ReconcilerConfig) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Enable refinement.
    pub fn with_refine(mut self, refine: RefineConfig) -> Self {
        self.refine = Some(refine);
        self
    }

    /// Set the master seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the allocation policy.
    pub fn with_policy(mut self, policy: AllocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the complete/partial schedule.
    pub fn with_split(mut self, split: SplitSchedule) -> Self {
        self.split = split;
        self
    }

    /// Settings handed to every stratum's synthesizer.
    pub fn synthesizer_config(&self) -> SynthesizerConfig {
        SynthesizerConfig::default()
            .with_update_iterations(self.update_iterations)
            .with_rounding(self.rounding)
            .with_split(self.split)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.public_weight) {
            return Err(SynthError::config("public_weight must be in [0, 1]"));
        }
        if self.stratum_granularity == 0 {
            return Err(SynthError::config("stratum_granularity must be positive"));
        }
        self.reconciler.validate()?;
        self.synthesizer_config().validate()?;
        if let Some(refine) = &self.refine {
            refine.validate()?;
        }
        self.policy.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = SynthesisConfig::default();
        assert_eq!(cfg.update_iterations, 60);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.synthesizer_config().update_iterations, 60);
    }

    #[test]
    fn rounding_by_name() {
        let cfg = SynthesisConfig::default()
            .with_rounding_name("stochastic")
            .expect("known mode");
        assert_eq!(cfg.rounding, RoundingMode::Stochastic);

        let err = SynthesisConfig::default()
            .with_rounding_name("banker")
            .expect_err("unknown mode");
        assert!(err.is_configuration());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(SynthesisConfig::default().with_public_weight(1.5).validate().is_err());
        assert!(SynthesisConfig::default()
            .with_stratum_granularity(0)
            .validate()
            .is_err());
        assert!(SynthesisConfig::default()
            .with_refine(RefineConfig::default().with_pool_factor(0.2))
            .validate()
            .is_err());
    }
}
