//! Core primitives for differentially private marginal synthesis.
//!
//! This crate provides the building blocks shared by the accounting, engine
//! and facade crates: the attribute catalog, marginal views with their
//! mixed-radix cell encoding, count vectors, noise mechanisms, rounding and
//! record sampling helpers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod counts;
pub mod domain;
pub mod error;
pub mod noise;
pub mod records;
pub mod rounding;
pub mod sampling;
pub mod view;

pub use counts::{l1_distance, normalize_to_distribution, sanitize, total_mass, Counts};
pub use domain::AttributeDomain;
pub use error::{Result, SynthError};
pub use noise::{add_gaussian_noise, add_laplace_noise, NoiseMechanism};
pub use records::{random_records, records_from_columns, Records};
pub use rounding::{apportion, round_to_granularity, RoundingMode};
pub use sampling::{sample_with_replacement, sample_without_replacement, SortedCells};
pub use view::MarginalView;

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{
        add_gaussian_noise, add_laplace_noise, apportion, l1_distance, normalize_to_distribution,
        random_records, records_from_columns, round_to_granularity, sample_with_replacement,
        sample_without_replacement, sanitize, total_mass, AttributeDomain, Counts, MarginalView,
        NoiseMechanism, Records, Result, RoundingMode, SortedCells, SynthError,
    };
}
