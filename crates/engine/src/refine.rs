//! Keep/reserve swap refinement of a fixed candidate pool.
//!
//! A candidate pool larger than the wanted record count is split into a keep
//! set of exactly `target_size` records and a reserve. Random keep/reserve
//! pairs are swapped whenever the swap lowers the score, the summed L1
//! distance between the keep set's marginals and the scoring views.

use margsynth_core::{sample_without_replacement, MarginalView, Records, Result, SynthError};
use ndarray::Axis;
use rand::Rng;
use tracing::debug;

/// Settings for [`refine`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefineConfig {
    /// Candidate pool size as a multiple of the wanted record count.
    pub pool_factor: f64,
    /// Maximum swap rounds.
    pub max_rounds: usize,
    /// Swap attempts per round.
    pub swaps_per_round: usize,
    /// A round improving the score by less than this ends refinement.
    pub min_improvement: f64,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            pool_factor: 1.25,
            max_rounds: 200,
            swaps_per_round: 64,
            min_improvement: 1e-6,
        }
    }
}

impl RefineConfig {
    /// Set the pool factor.
    pub fn with_pool_factor(mut self, pool_factor: f64) -> Self {
        self.pool_factor = pool_factor;
        self
    }

    /// Set the round cap.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set the swap attempts per round.
    pub fn with_swaps_per_round(mut self, swaps: usize) -> Self {
        self.swaps_per_round = swaps;
        self
    }

    /// Candidate pool size for `target_size` wanted records.
    pub fn pool_size(&self, target_size: usize) -> usize {
        ((target_size as f64) * self.pool_factor).ceil() as usize
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if !self.pool_factor.is_finite() || self.pool_factor < 1.0 {
            return Err(SynthError::config("refine pool_factor must be >= 1"));
        }
        if self.swaps_per_round == 0 {
            return Err(SynthError::config("refine needs at least one swap per round"));
        }
        if !self.min_improvement.is_finite() || self.min_improvement < 0.0 {
            return Err(SynthError::config("refine min_improvement must be >= 0"));
        }
        Ok(())
    }
}

/// Result of [`refine`].
#[derive(Clone, Debug, PartialEq)]
pub struct RefineOutcome {
    /// The kept records, in candidate order.
    pub records: Records,
    /// Final score.
    pub score: f64,
    /// Rounds executed.
    pub rounds: usize,
    /// Whether a round fell below the improvement threshold.
    pub stopped_early: bool,
}

struct ScoreState {
    cells: Vec<Vec<usize>>,
    targets: Vec<Vec<f64>>,
    kept: Vec<Vec<f64>>,
    size: f64,
}

impl ScoreState {
    fn new(candidates: &Records, views: &[MarginalView], keep: &[usize]) -> Self {
        let cells: Vec<Vec<usize>> = views.iter().map(|v| v.encode_records(candidates)).collect();
        let targets = views.iter().map(|v| v.normalized_counts().to_vec()).collect();
        let kept = views
            .iter()
            .zip(cells.iter())
            .map(|(v, encoded)| {
                let mut counts = vec![0.0; v.domain_size()];
                for &row in keep {
                    counts[encoded[row]] += 1.0;
                }
                counts
            })
            .collect();
        Self {
            cells,
            targets,
            kept,
            size: keep.len() as f64,
        }
    }

    fn score(&self) -> f64 {
        self.kept
            .iter()
            .zip(self.targets.iter())
            .map(|(kept, target)| {
                kept.iter()
                    .zip(target.iter())
                    .map(|(k, t)| (k / self.size - t).abs())
                    .sum::<f64>()
            })
            .sum()
    }

    fn term(&self, view: usize, cell: usize, count: f64) -> f64 {
        (count / self.size - self.targets[view][cell]).abs()
    }

    fn swap_delta(&self, out: usize, inn: usize) -> f64 {
        let mut delta = 0.0;
        for view in 0..self.cells.len() {
            let from = self.cells[view][out];
            let to = self.cells[view][inn];
            if from == to {
                continue;
            }
            let k_from = self.kept[view][from];
            let k_to = self.kept[view][to];
            delta += self.term(view, from, k_from - 1.0) - self.term(view, from, k_from);
            delta += self.term(view, to, k_to + 1.0) - self.term(view, to, k_to);
        }
        delta
    }

    fn apply_swap(&mut self, out: usize, inn: usize) {
        for view in 0..self.cells.len() {
            self.kept[view][self.cells[view][out]] -= 1.0;
            self.kept[view][self.cells[view][inn]] += 1.0;
        }
    }
}

/// Summed L1 distance between the marginals of `records` and `views`.
pub fn refine_score(records: &Records, views: &[MarginalView]) -> f64 {
    let all: Vec<usize> = (0..records.nrows()).collect();
    if all.is_empty() {
        return views.len() as f64;
    }
    ScoreState::new(records, views, &all).score()
}

/// Pick `target_size` of `candidates` that best match `views`.
pub fn refine<R: Rng + ?Sized>(
    candidates: &Records,
    views: &[MarginalView],
    target_size: usize,
    config: &RefineConfig,
    rng: &mut R,
) -> Result<RefineOutcome> {
    config.validate()?;
    let pool = candidates.nrows();
    if target_size > pool {
        return Err(SynthError::invalid(format!(
            "cannot keep {target_size} records from a pool of {pool}"
        )));
    }
    if target_size == 0 {
        return Ok(RefineOutcome {
            records: Records::zeros((0, candidates.ncols())),
            score: views.len() as f64,
            rounds: 0,
            stopped_early: false,
        });
    }

    let all: Vec<usize> = (0..pool).collect();
    let mut keep = sample_without_replacement(&all, target_size, rng);
    let mut in_keep = vec![false; pool];
    for &row in &keep {
        in_keep[row] = true;
    }
    let mut reserve: Vec<usize> = (0..pool).filter(|&row| !in_keep[row]).collect();

    let mut state = ScoreState::new(candidates, views, &keep);
    let mut score = state.score();
    let mut rounds = 0usize;
    let mut stopped_early = false;
    if !reserve.is_empty() {
        while rounds < config.max_rounds {
            rounds += 1;
            let mut improvement = 0.0;
            for _ in 0..config.swaps_per_round {
                let ki = rng.gen_range(0..keep.len());
                let ri = rng.gen_range(0..reserve.len());
                let delta = state.swap_delta(keep[ki], reserve[ri]);
                if delta < 0.0 {
                    state.apply_swap(keep[ki], reserve[ri]);
                    std::mem::swap(&mut keep[ki], &mut reserve[ri]);
                    improvement -= delta;
                }
            }
            score -= improvement;
            if improvement < config.min_improvement {
                debug!(rounds, score, improvement, "refinement stopped early");
                stopped_early = true;
                break;
            }
        }
    }

    keep.sort_unstable();
    Ok(RefineOutcome {
        records: candidates.select(Axis(0), &keep),
        score,
        rounds,
        stopped_early,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use margsynth_core::AttributeDomain;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn half_and_half(pool: usize) -> Records {
        let mut records = Records::zeros((pool, 1));
        for row in 0..pool / 2 {
            records[[row, 0]] = 1;
        }
        records
    }

    #[test]
    fn keeps_exact_size_and_improves() {
        let domain = AttributeDomain::from_sizes(vec![2]).expect("domain");
        let view = MarginalView::from_counts(&domain, &[0], array![0.8, 0.2]).expect("view");
        let candidates = half_and_half(200);
        let cfg = RefineConfig::default().with_swaps_per_round(256);
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let out = refine(&candidates, &[view.clone()], 100, &cfg, &mut rng).expect("refine");
        assert_eq!(out.records.nrows(), 100);
        assert!(out.stopped_early);
        let zeros = out.records.iter().filter(|&&v| v == 0).count();
        assert!((78..=82).contains(&zeros), "zeros = {zeros}");
        let fresh = refine_score(&out.records, &[view]);
        assert!((fresh - out.score).abs() < 1e-9);
    }

    #[test]
    fn full_pool_is_returned_untouched() {
        let domain = AttributeDomain::from_sizes(vec![2]).expect("domain");
        let view = MarginalView::from_counts(&domain, &[0], array![0.8, 0.2]).expect("view");
        let candidates = half_and_half(10);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = refine(&candidates, &[view], 10, &RefineConfig::default(), &mut rng)
            .expect("refine");
        assert_eq!(out.rounds, 0);
        assert_eq!(out.records, candidates);
        assert!((out.score - 0.6).abs() < 1e-12);
    }

    #[test]
    fn rejects_oversized_target() {
        let candidates = half_and_half(4);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(refine(&candidates, &[], 5, &RefineConfig::default(), &mut rng).is_err());
    }

    #[test]
    fn pool_size_rounds_up() {
        let cfg = RefineConfig::default().with_pool_factor(1.5);
        assert_eq!(cfg.pool_size(7), 11);
        assert!(RefineConfig::default().with_pool_factor(0.5).validate().is_err());
    }
}
