//! Noise calibration for `k` marginal measurements sharing one budget.
//!
//! Every function maps a total `(epsilon, delta)`, a per-query sensitivity and
//! the number `k` of independent measurements to the noise each measurement
//! must receive. For fixed `(epsilon, delta)` the returned noise scale never
//! decreases as `k` grows, and for fixed `(delta, k)` it never increases as
//! `epsilon` grows.

use std::fmt;

use margsynth_core::{NoiseMechanism, Result, SynthError};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, warn};

use crate::params::validate_budget;

/// Iteration cap for the bisection searches in this module.
pub const ROOT_MAX_ITERS: usize = 200;

/// Outcome of a bracketed numeric search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootSolve {
    /// Best estimate found.
    pub value: f64,
    /// Number of bisection steps performed.
    pub iterations: usize,
    /// Whether the bracket shrank below tolerance before the iteration cap.
    pub converged: bool,
}

/// Composition theorem used to split a budget across measurements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Composition {
    /// Basic composition with Laplace noise: `epsilon / k` per measurement.
    NaiveLaplace,
    /// Advanced composition with Laplace noise.
    AdvancedLaplace,
    /// Advanced composition with analytically calibrated Gaussian noise.
    AdvancedGaussian,
    /// Zero-concentrated DP composition with Gaussian noise.
    ZcdpGaussian,
    /// Whichever of the above yields the lowest variance.
    #[default]
    Auto,
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Composition::NaiveLaplace => "naive-laplace",
            Composition::AdvancedLaplace => "advanced-laplace",
            Composition::AdvancedGaussian => "advanced-gaussian",
            Composition::ZcdpGaussian => "zcdp-gaussian",
            Composition::Auto => "auto",
        };
        f.pad(name)
    }
}

/// Noise chosen for a group of measurements.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseCalibration {
    /// Composition actually used (never [`Composition::Auto`]).
    pub composition: Composition,
    /// Per-measurement noise distribution.
    pub mechanism: NoiseMechanism,
    /// Number of measurements the budget was split across.
    pub measurements: usize,
}

fn validate(epsilon: f64, delta: f64, sensitivity: f64, k: usize) -> Result<()> {
    validate_budget(epsilon, delta)?;
    if !sensitivity.is_finite() || sensitivity <= 0.0 {
        return Err(SynthError::invalid("sensitivity must be positive and finite"));
    }
    if k == 0 {
        return Err(SynthError::invalid("number of measurements must be positive"));
    }
    Ok(())
}

/// Laplace scale under basic composition: `sensitivity / (epsilon / k)`.
pub fn naive_laplace_scale(epsilon: f64, sensitivity: f64, k: usize) -> Result<f64> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(SynthError::invalid("epsilon must be positive and finite"));
    }
    if !sensitivity.is_finite() || sensitivity <= 0.0 {
        return Err(SynthError::invalid("sensitivity must be positive and finite"));
    }
    if k == 0 {
        return Err(SynthError::invalid("number of measurements must be positive"));
    }
    let per_measurement = epsilon / k as f64;
    Ok(sensitivity / per_measurement)
}

/// Total epsilon of `k` mechanisms each `eps0`-DP under advanced composition.
pub fn advanced_composition_bound(eps0: f64, delta: f64, k: usize) -> f64 {
    let k = k as f64;
    (2.0 * k * (1.0 / delta).ln()).sqrt() * eps0 + k * eps0.exp_m1() * eps0
}

/// Largest per-measurement epsilon whose advanced composition stays within `epsilon`.
pub fn advanced_composition_epsilon(epsilon: f64, delta: f64, k: usize) -> Result<RootSolve> {
    advanced_composition_epsilon_with(epsilon, delta, k, ROOT_MAX_ITERS)
}

/// [`advanced_composition_epsilon`] with an explicit iteration cap.
///
/// If the cap is hit the lower end of the bracket is returned, which still
/// satisfies the composition bound.
pub fn advanced_composition_epsilon_with(
    epsilon: f64,
    delta: f64,
    k: usize,
    max_iters: usize,
) -> Result<RootSolve> {
    validate_budget(epsilon, delta)?;
    if k == 0 {
        return Err(SynthError::invalid("number of measurements must be positive"));
    }

    let mut lo = 0.0f64;
    let mut hi = epsilon;
    let mut expansions = 0usize;
    while advanced_composition_bound(hi, delta, k) < epsilon && expansions < 60 {
        lo = hi;
        hi *= 2.0;
        expansions += 1;
    }

    let mut iterations = 0usize;
    let mut converged = false;
    while iterations < max_iters {
        if hi - lo <= 1e-14 * hi.max(f64::MIN_POSITIVE) {
            converged = true;
            break;
        }
        let mid = 0.5 * (lo + hi);
        if advanced_composition_bound(mid, delta, k) <= epsilon {
            lo = mid;
        } else {
            hi = mid;
        }
        iterations += 1;
    }
    if !converged && hi - lo <= 1e-14 * hi.max(f64::MIN_POSITIVE) {
        converged = true;
    }

    if !converged {
        warn!(
            epsilon,
            delta,
            k,
            iterations,
            estimate = lo,
            "advanced composition solve hit its iteration cap; using best estimate"
        );
    }

    Ok(RootSolve {
        value: lo,
        iterations,
        converged,
    })
}

/// Laplace scale under advanced composition.
pub fn advanced_laplace_scale(epsilon: f64, delta: f64, sensitivity: f64, k: usize) -> Result<f64> {
    validate(epsilon, delta, sensitivity, k)?;
    let eps0 = advanced_composition_epsilon(epsilon, delta, k)?.value;
    if eps0 <= 0.0 {
        return Err(SynthError::numerical(
            "advanced composition produced a zero per-measurement epsilon",
        ));
    }
    Ok(sensitivity / eps0)
}

fn gaussian_delta_for_sigma(sigma: f64, eps: f64, normal: &Normal) -> f64 {
    if !sigma.is_finite() || sigma <= 0.0 || !eps.is_finite() {
        return 1.0;
    }
    let term1 = normal.cdf(-eps * sigma + 1.0 / (2.0 * sigma));
    let term2 = eps.exp() * normal.cdf(-eps * sigma - 1.0 / (2.0 * sigma));
    (term1 - term2).clamp(0.0, 1.0)
}

/// Smallest Gaussian sigma (unit sensitivity) that is `(epsilon, delta)`-DP.
///
/// Uses the exact privacy profile of the Gaussian mechanism rather than the
/// classical `sqrt(2 ln(1.25/delta)) / epsilon` bound.
pub fn analytic_gaussian_sigma(epsilon: f64, delta: f64) -> Result<RootSolve> {
    validate_budget(epsilon, delta)?;
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| SynthError::numerical(format!("standard normal: {e}")))?;

    let mut lo = 0.0f64;
    let mut hi = 1.0f64;
    let mut expansions = 0usize;
    while gaussian_delta_for_sigma(hi, epsilon, &normal) > delta && expansions < 80 {
        lo = hi;
        hi *= 2.0;
        expansions += 1;
    }

    let mut iterations = 0usize;
    let mut converged = false;
    while iterations < ROOT_MAX_ITERS {
        if hi - lo <= 1e-12 * hi {
            converged = true;
            break;
        }
        let mid = 0.5 * (lo + hi);
        if gaussian_delta_for_sigma(mid, epsilon, &normal) > delta {
            lo = mid;
        } else {
            hi = mid;
        }
        iterations += 1;
    }

    if !converged {
        warn!(
            epsilon,
            delta,
            iterations,
            estimate = hi,
            "analytic gaussian calibration hit its iteration cap; using best estimate"
        );
    }

    Ok(RootSolve {
        value: hi,
        iterations,
        converged,
    })
}

/// Gaussian sigma under advanced composition.
///
/// Half of `delta` pays for the composition slack and the other half is split
/// evenly across the `k` Gaussian measurements.
pub fn advanced_gauss_sigma(epsilon: f64, delta: f64, sensitivity: f64, k: usize) -> Result<f64> {
    validate(epsilon, delta, sensitivity, k)?;
    let eps0 = advanced_composition_epsilon(epsilon, delta / 2.0, k)?.value;
    if eps0 <= 0.0 {
        return Err(SynthError::numerical(
            "advanced composition produced a zero per-measurement epsilon",
        ));
    }
    let delta0 = delta / (2.0 * k as f64);
    let sigma = analytic_gaussian_sigma(eps0, delta0)?.value;
    Ok(sigma * sensitivity)
}

/// Gaussian sigma under zCDP composition.
///
/// Solves `epsilon = rho + 2 sqrt(rho ln(1/delta))` with
/// `rho = k sensitivity² / (2 sigma²)`, which gives
/// `sigma = (sqrt(T) + sqrt(T + 2 k sensitivity² epsilon)) / (2 epsilon)` for
/// `T = 2 k sensitivity² ln(1/delta)`.
pub fn gauss_zcdp_sigma(epsilon: f64, delta: f64, sensitivity: f64, k: usize) -> Result<f64> {
    validate(epsilon, delta, sensitivity, k)?;
    let k = k as f64;
    let s2 = sensitivity * sensitivity;
    let t = 2.0 * k * s2 * (1.0 / delta).ln();
    Ok((t.sqrt() + (t + 2.0 * k * s2 * epsilon).sqrt()) / (2.0 * epsilon))
}

/// Calibrate noise for `k` measurements under the given composition.
pub fn calibrate(
    composition: Composition,
    epsilon: f64,
    delta: f64,
    sensitivity: f64,
    k: usize,
) -> Result<NoiseCalibration> {
    validate(epsilon, delta, sensitivity, k)?;
    let mechanism = match composition {
        Composition::NaiveLaplace => NoiseMechanism::Laplace {
            scale: naive_laplace_scale(epsilon, sensitivity, k)?,
        },
        Composition::AdvancedLaplace => NoiseMechanism::Laplace {
            scale: advanced_laplace_scale(epsilon, delta, sensitivity, k)?,
        },
        Composition::AdvancedGaussian => NoiseMechanism::Gaussian {
            sigma: advanced_gauss_sigma(epsilon, delta, sensitivity, k)?,
        },
        Composition::ZcdpGaussian => NoiseMechanism::Gaussian {
            sigma: gauss_zcdp_sigma(epsilon, delta, sensitivity, k)?,
        },
        Composition::Auto => return select_mechanism(epsilon, delta, sensitivity, k),
    };
    debug!(
        %composition,
        mechanism = mechanism.name(),
        std_dev = mechanism.std_dev(),
        k,
        "calibrated noise"
    );
    Ok(NoiseCalibration {
        composition,
        mechanism,
        measurements: k,
    })
}

/// Pick the lowest-variance mechanism among Laplace and zCDP Gaussian.
///
/// The Laplace candidate uses whichever of basic and advanced composition
/// yields the smaller scale.
pub fn select_mechanism(
    epsilon: f64,
    delta: f64,
    sensitivity: f64,
    k: usize,
) -> Result<NoiseCalibration> {
    let mut best = calibrate(Composition::NaiveLaplace, epsilon, delta, sensitivity, k)?;
    for candidate in [Composition::AdvancedLaplace, Composition::ZcdpGaussian] {
        let calibrated = calibrate(candidate, epsilon, delta, sensitivity, k)?;
        if calibrated.mechanism.variance() < best.mechanism.variance() {
            best = calibrated;
        }
    }
    debug!(
        composition = %best.composition,
        variance = best.mechanism.variance(),
        k,
        "selected lowest-variance mechanism"
    );
    Ok(best)
}
