//! Privacy accounting for noisy marginal measurements.
//!
//! Maps a total `(epsilon, delta)` budget and a sensitivity to the noise that
//! each of `k` marginal measurements must receive, under basic, advanced or
//! zero-concentrated composition, and splits a run's budget across named
//! marginal groups.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod budget;
pub mod calibrate;
pub mod params;

pub use budget::{
    AllocationPolicy, BudgetAllocation, GroupBudget, GroupShare, ONE_WAY_GROUP, STRATUM_GROUP,
    TWO_WAY_GROUP,
};
pub use calibrate::{
    advanced_composition_bound, advanced_composition_epsilon, advanced_composition_epsilon_with,
    advanced_gauss_sigma, advanced_laplace_scale, analytic_gaussian_sigma, calibrate,
    gauss_zcdp_sigma, naive_laplace_scale, select_mechanism, Composition, NoiseCalibration,
    RootSolve, ROOT_MAX_ITERS,
};
pub use params::PrivacyParams;

/// Common imports for privacy accounting.
pub mod prelude {
    pub use crate::{
        advanced_composition_epsilon, advanced_gauss_sigma, advanced_laplace_scale,
        analytic_gaussian_sigma, calibrate, gauss_zcdp_sigma, naive_laplace_scale,
        select_mechanism, AllocationPolicy, BudgetAllocation, Composition, GroupBudget,
        GroupShare, NoiseCalibration, PrivacyParams, RootSolve,
    };
}
