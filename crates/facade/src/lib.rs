//! Differentially private synthetic microdata from noisy, reconciled marginals.
//!
//! The facade wires the workspace crates into one pipeline: marginals named
//! by a [`MeasurementPlan`] are measured under a split privacy budget,
//! reconciled, and used as targets for per-stratum record synthesis.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod pipeline;
pub mod plan;
pub mod source;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use margsynth_accounting as accounting;
pub use margsynth_core as core;
pub use margsynth_engine as engine;
pub use margsynth_prng as prng;

pub use config::SynthesisConfig;
pub use margsynth_accounting::{
    calibrate, gauss_zcdp_sigma, select_mechanism, AllocationPolicy, BudgetAllocation,
    Composition, NoiseCalibration, PrivacyParams, ONE_WAY_GROUP, STRATUM_GROUP, TWO_WAY_GROUP,
};
pub use margsynth_core::{
    AttributeDomain, Counts, MarginalView, Records, Result, RoundingMode, SynthError,
};
pub use margsynth_engine::{
    Initialization, ReconcileReport, Reconciler, ReconcilerConfig, RecordSynthesizer,
    RefineConfig, SplitSchedule, SynthesizerConfig,
};
pub use margsynth_prng::SeedKey;
pub use pipeline::{Measurement, Orchestrator, StratumBlock, SyntheticTable};
pub use plan::{MarginalGroup, MeasurementPlan};
pub use source::{MarginalSource, PrecomputedSource, RecordTableSource};

/// Convenience prelude covering the whole pipeline.
pub mod prelude {
    pub use crate::config::SynthesisConfig;
    pub use crate::pipeline::{Measurement, Orchestrator, StratumBlock, SyntheticTable};
    pub use crate::plan::{MarginalGroup, MeasurementPlan};
    pub use crate::source::{MarginalSource, PrecomputedSource, RecordTableSource};
    pub use margsynth_accounting::prelude::*;
    pub use margsynth_core::prelude::*;
    pub use margsynth_engine::prelude::*;
    pub use margsynth_prng::prelude::*;
}
