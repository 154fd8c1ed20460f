//! Noise mechanisms for marginal measurements.

use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};

use crate::counts::Counts;

/// Add Gaussian noise to a count vector in-place.
pub fn add_gaussian_noise<R: Rng + ?Sized>(counts: &mut Counts, sigma: f64, rng: &mut R) {
    if !sigma.is_finite() || sigma <= 0.0 || counts.is_empty() {
        return;
    }

    let dist = match Normal::new(0.0, sigma) {
        Ok(d) => d,
        Err(_) => return,
    };

    counts.mapv_inplace(|x| {
        if x.is_finite() {
            x + dist.sample(rng)
        } else {
            x
        }
    });
}

/// Add Laplace noise to a count vector in-place.
pub fn add_laplace_noise<R: Rng + ?Sized>(counts: &mut Counts, scale: f64, rng: &mut R) {
    if !scale.is_finite() || scale <= 0.0 || counts.is_empty() {
        return;
    }

    // Laplace noise can be sampled as the difference of two exponentials.
    let dist = match Exp::new(1.0 / scale) {
        Ok(d) => d,
        Err(_) => return,
    };

    counts.mapv_inplace(|x| {
        if x.is_finite() {
            x + dist.sample(rng) - dist.sample(rng)
        } else {
            x
        }
    });
}

/// A calibrated additive noise distribution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NoiseMechanism {
    /// Laplace noise with scale `b` (variance `2b²`).
    Laplace {
        /// Scale parameter.
        scale: f64,
    },
    /// Gaussian noise with standard deviation `sigma`.
    Gaussian {
        /// Standard deviation.
        sigma: f64,
    },
}

impl NoiseMechanism {
    /// Variance of the noise added to each cell.
    pub fn variance(&self) -> f64 {
        match *self {
            NoiseMechanism::Laplace { scale } => 2.0 * scale * scale,
            NoiseMechanism::Gaussian { sigma } => sigma * sigma,
        }
    }

    /// Standard deviation of the noise added to each cell.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Short mechanism name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            NoiseMechanism::Laplace { .. } => "laplace",
            NoiseMechanism::Gaussian { .. } => "gaussian",
        }
    }

    /// Add noise to every cell of `counts`.
    pub fn apply<R: Rng + ?Sized>(&self, counts: &mut Counts, rng: &mut R) {
        match *self {
            NoiseMechanism::Laplace { scale } => add_laplace_noise(counts, scale, rng),
            NoiseMechanism::Gaussian { sigma } => add_gaussian_noise(counts, sigma, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_gaussian_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut c1 = Counts::zeros(100);
        add_gaussian_noise(&mut c1, 1.0, &mut rng);

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut c2 = Counts::zeros(100);
        add_gaussian_noise(&mut c2, 1.0, &mut rng);

        assert_eq!(c1, c2);
    }

    #[test]
    fn test_laplace_statistics() {
        let mut rng = ChaCha8Rng::seed_from_u64(123);
        let mut c = Counts::zeros(20_000);
        NoiseMechanism::Laplace { scale: 2.0 }.apply(&mut c, &mut rng);

        let n = c.len() as f64;
        let mean = c.sum() / n;
        let var = c.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        assert!(mean.abs() < 0.1);
        assert!((var - 8.0).abs() < 0.5);
    }

    #[test]
    fn test_zero_scale_is_noop() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut c = Counts::from_elem(4, 3.0);
        NoiseMechanism::Gaussian { sigma: 0.0 }.apply(&mut c, &mut rng);
        assert_eq!(c, Counts::from_elem(4, 3.0));
    }

    #[test]
    fn test_variance() {
        assert_eq!(NoiseMechanism::Laplace { scale: 3.0 }.variance(), 18.0);
        assert_eq!(NoiseMechanism::Gaussian { sigma: 3.0 }.std_dev(), 3.0);
    }
}
