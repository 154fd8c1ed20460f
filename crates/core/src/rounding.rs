//! Rounding of fractional record amounts to whole records.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::SynthError;

/// How fractional add/remove amounts become whole record counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoundingMode {
    /// Round half away from zero.
    #[default]
    Deterministic,
    /// Floor or ceil at random, preserving the expectation.
    Stochastic,
}

impl FromStr for RoundingMode {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deterministic" | "normal" | "nearest" => Ok(Self::Deterministic),
            "stochastic" | "random" => Ok(Self::Stochastic),
            other => Err(SynthError::UnsupportedRounding {
                mode: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingMode::Deterministic => write!(f, "deterministic"),
            RoundingMode::Stochastic => write!(f, "stochastic"),
        }
    }
}

impl RoundingMode {
    /// Round a single non-negative amount. Negative or non-finite input yields zero.
    pub fn round<R: Rng + ?Sized>(&self, value: f64, rng: &mut R) -> usize {
        if !value.is_finite() || value <= 0.0 {
            return 0;
        }
        match self {
            RoundingMode::Deterministic => value.round() as usize,
            RoundingMode::Stochastic => {
                let floor = value.floor();
                let frac = value - floor;
                if frac > 0.0 && rng.gen::<f64>() < frac {
                    floor as usize + 1
                } else {
                    floor as usize
                }
            }
        }
    }

    /// Round every amount of `values`.
    pub fn round_vector<R: Rng + ?Sized>(&self, values: &[f64], rng: &mut R) -> Vec<usize> {
        values.iter().map(|&v| self.round(v, rng)).collect()
    }
}

/// Split `total` into whole parts proportional to `weights` (largest remainder).
///
/// The parts always sum to exactly `total`. Non-positive weights receive zero;
/// if no weight is positive the total is spread evenly.
pub fn apportion(weights: &[f64], total: usize) -> Vec<usize> {
    if weights.is_empty() {
        return Vec::new();
    }
    let clean: Vec<f64> = weights
        .iter()
        .map(|&w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
        .collect();
    let sum: f64 = clean.iter().sum();
    let shares: Vec<f64> = if sum > 0.0 {
        clean.iter().map(|w| w / sum * total as f64).collect()
    } else {
        vec![total as f64 / weights.len() as f64; weights.len()]
    };

    let mut parts: Vec<usize> = shares.iter().map(|s| s.floor() as usize).collect();
    let assigned: usize = parts.iter().sum();
    let mut remaining = total.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = shares[a] - shares[a].floor();
        let rb = shares[b] - shares[b].floor();
        rb.partial_cmp(&ra)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    for &i in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        parts[i] += 1;
        remaining -= 1;
    }
    parts
}

/// Round a record count to the nearest multiple of `granularity`.
pub fn round_to_granularity(value: f64, granularity: usize) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let g = granularity.max(1) as f64;
    ((value / g).round() * g) as usize
}
