//! Marginal reconciliation and record synthesis.
//!
//! [`Reconciler`] makes a family of noisy marginal views mutually consistent,
//! [`RecordSynthesizer`] moves a record pool toward the reconciled targets,
//! and [`refine`] trims an oversized pool to an exact record count.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consistency;
pub mod refine;
pub mod synthesizer;
pub mod update;

pub use consistency::{
    consist_on_subset, max_inconsistency, normalize_views, rebalance_negative_mass,
    shared_subsets, ReconcileReport, Reconciler, ReconcilerConfig,
};
pub use refine::{refine, refine_score, RefineConfig, RefineOutcome};
pub use synthesizer::{
    initial_records, ErrorTracker, Initialization, RecordSynthesizer, SplitSchedule,
    SynthesizerConfig, SynthesizerState,
};
pub use update::{
    apply_update, find_optimal_beta, prepare_update, records_removed, synthetic_distribution,
    BetaSearch, UpdateOutcome, UpdatePlan, BETA_MAX_ROUNDS, BETA_TOLERANCE,
};

/// Common imports for synthesis.
pub mod prelude {
    pub use crate::{
        find_optimal_beta, rebalance_negative_mass, refine, ErrorTracker, Initialization,
        ReconcileReport, Reconciler, ReconcilerConfig, RecordSynthesizer, RefineConfig,
        RefineOutcome, SplitSchedule, SynthesizerConfig, SynthesizerState,
    };
}
