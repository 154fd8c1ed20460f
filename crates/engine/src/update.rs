//! One update of the record pool toward a single target view.
//!
//! Cells of the view are classified against the live synthetic marginal:
//! under-represented cells receive records, cells with no synthetic records
//! but positive target mass are filled by overwriting, and over-represented
//! cells give up records. The removal ratio `beta` is searched so that the
//! number of records removed balances the number added.

use margsynth_core::{
    sample_with_replacement, sample_without_replacement, Counts, MarginalView, Records,
    RoundingMode, SortedCells,
};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Bisection rounds allowed in [`find_optimal_beta`].
pub const BETA_MAX_ROUNDS: usize = 50;
/// Allowed gap, in records, between removed and added mass.
pub const BETA_TOLERANCE: f64 = 1.0;

/// Outcome of the mass-balance search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BetaSearch {
    /// Uniform cap on the relative reduction of over-represented cells.
    pub beta: f64,
    /// Records removed at `beta`, before rounding.
    pub removed: f64,
    /// Bisection rounds used.
    pub rounds: usize,
    /// Whether removed mass matched the requested amount within tolerance.
    pub converged: bool,
}

/// Records removed from the `over` cells when reductions are capped at `beta`.
pub fn records_removed(
    synth: &Counts,
    target: &Counts,
    over: &[usize],
    beta: f64,
    num_records: usize,
) -> f64 {
    let n = num_records as f64;
    over.iter()
        .map(|&cell| {
            let s = synth[cell];
            if s <= 0.0 {
                return 0.0;
            }
            ((s - target[cell]) / s).min(beta) * s * n
        })
        .sum()
}

/// Bisect for the reduction cap `beta` in `[0, 1]` that removes `num_add` records.
///
/// The removed mass is monotone in `beta`. When even `beta = 1` cannot match
/// the request, or the round cap is reached, the best bound found is returned
/// with `converged == false`.
pub fn find_optimal_beta(
    synth: &Counts,
    target: &Counts,
    over: &[usize],
    num_add: f64,
    num_records: usize,
) -> BetaSearch {
    if num_add <= 0.0 || over.is_empty() {
        return BetaSearch {
            beta: 0.0,
            removed: 0.0,
            rounds: 0,
            converged: num_add < BETA_TOLERANCE,
        };
    }
    let full = records_removed(synth, target, over, 1.0, num_records);
    if full < num_add - BETA_TOLERANCE {
        debug!(requested = num_add, available = full, "over-represented cells cannot balance additions");
        return BetaSearch {
            beta: 1.0,
            removed: full,
            rounds: 0,
            converged: false,
        };
    }

    let mut lo = 0.0;
    let mut hi = 1.0;
    let mut beta = 1.0;
    let mut removed = full;
    for round in 1..=BETA_MAX_ROUNDS {
        beta = 0.5 * (lo + hi);
        removed = records_removed(synth, target, over, beta, num_records);
        if (removed - num_add).abs() < BETA_TOLERANCE {
            return BetaSearch {
                beta,
                removed,
                rounds: round,
                converged: true,
            };
        }
        if removed < num_add {
            lo = beta;
        } else {
            hi = beta;
        }
    }
    debug!(beta, removed, requested = num_add, "beta search hit round cap");
    BetaSearch {
        beta,
        removed,
        rounds: BETA_MAX_ROUNDS,
        converged: false,
    }
}

/// Synthetic marginal, as a distribution, of pre-encoded records.
pub fn synthetic_distribution(domain_size: usize, encoded: &[usize]) -> Counts {
    let mut synth = Counts::zeros(domain_size);
    for &cell in encoded {
        synth[cell] += 1.0;
    }
    if !encoded.is_empty() {
        synth /= encoded.len() as f64;
    }
    synth
}

/// Whole-record moves planned for one target view.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdatePlan {
    /// Under-represented cells and the records each should gain.
    pub under: Vec<(usize, usize)>,
    /// Cells with no synthetic records and the records each should gain.
    pub zero: Vec<(usize, usize)>,
    /// Over-represented cells and the records each should give up.
    pub reduce: Vec<(usize, usize)>,
    /// Mass-balance search result.
    pub beta: BetaSearch,
}

impl UpdatePlan {
    /// Records requested by under and zero cells.
    pub fn total_add(&self) -> usize {
        self.under.iter().chain(self.zero.iter()).map(|&(_, a)| a).sum()
    }

    /// Records requested from over-represented cells.
    pub fn total_reduce(&self) -> usize {
        self.reduce.iter().map(|&(_, a)| a).sum()
    }
}

/// Classify cells and size the moves for a single view.
///
/// `synth` and `target` are distributions over the view's cells, `alpha` is
/// the annealed add rate.
pub fn prepare_update<R: Rng + ?Sized>(
    synth: &Counts,
    target: &Counts,
    alpha: f64,
    num_records: usize,
    rounding: RoundingMode,
    rng: &mut R,
) -> UpdatePlan {
    let n = num_records as f64;
    let mut under = Vec::new();
    let mut zero = Vec::new();
    let mut over = Vec::new();
    let mut num_add = 0usize;
    for (cell, (&s, &t)) in synth.iter().zip(target.iter()).enumerate() {
        if s < t && s != 0.0 {
            let ratio = ((t - s) / s).min(alpha).min(1.0);
            let amount = rounding.round(ratio * s * n, rng);
            if amount > 0 {
                under.push((cell, amount));
                num_add += amount;
            }
        } else if s == 0.0 && t > 0.0 {
            let amount = rounding.round(alpha * t * n, rng);
            if amount > 0 {
                zero.push((cell, amount));
                num_add += amount;
            }
        } else if s > t {
            over.push(cell);
        }
    }

    let beta = find_optimal_beta(synth, target, &over, num_add as f64, num_records);
    let reduce = over
        .iter()
        .filter_map(|&cell| {
            let s = synth[cell];
            let ratio = ((s - target[cell]) / s).min(beta.beta);
            let amount = rounding.round(ratio * s * n, rng);
            (amount > 0).then_some((cell, amount))
        })
        .collect();
    UpdatePlan {
        under,
        zero,
        reduce,
        beta,
    }
}

/// Counts of what an update actually moved.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Records overwritten toward under or zero cells.
    pub added: usize,
    /// Victim records drawn from over-represented cells.
    pub removed: usize,
    /// Additions that went unserved for lack of victims.
    pub shortfall: usize,
}

fn write_cell(records: &mut Records, view: &MarginalView, cell: usize, row: usize) {
    let key = view.tuple_key();
    for (pos, &attr) in view.attributes_index().iter().enumerate() {
        records[[row, attr]] = key[[cell, pos]];
    }
}

/// Apply `plan` to the record pool.
///
/// Victims are sampled without replacement from each over-represented cell
/// and shuffled into one pool. Zero cells are served first by writing their
/// tuple into the view's columns. Each under cell then takes its share,
/// `complete_ratio` of it by copying whole donor rows from the cell and the
/// rest by writing the cell's tuple. Requests beyond the victim pool are
/// dropped.
pub fn apply_update<R: Rng + ?Sized>(
    records: &mut Records,
    view: &MarginalView,
    sorted: &SortedCells,
    plan: &UpdatePlan,
    complete_ratio: f64,
    rng: &mut R,
) -> UpdateOutcome {
    let mut victims: Vec<usize> = Vec::with_capacity(plan.total_reduce());
    for &(cell, amount) in &plan.reduce {
        victims.extend(sample_without_replacement(sorted.records_in(cell), amount, rng));
    }
    victims.shuffle(rng);

    let mut cursor = 0usize;
    let mut shortfall = 0usize;
    for &(cell, amount) in &plan.zero {
        let take = amount.min(victims.len() - cursor);
        shortfall += amount - take;
        for &row in &victims[cursor..cursor + take] {
            write_cell(records, view, cell, row);
        }
        cursor += take;
    }

    let complete_ratio = complete_ratio.clamp(0.0, 1.0);
    for &(cell, amount) in &plan.under {
        let take = amount.min(victims.len() - cursor);
        shortfall += amount - take;
        let targets = &victims[cursor..cursor + take];
        cursor += take;

        let complete = ((take as f64 * complete_ratio).round() as usize).min(take);
        let donors = sample_with_replacement(sorted.records_in(cell), complete, rng);
        let (whole, partial) = targets.split_at(donors.len());
        for (&row, &donor) in whole.iter().zip(donors.iter()) {
            let source = records.row(donor).to_owned();
            records.row_mut(row).assign(&source);
        }
        for &row in partial {
            write_cell(records, view, cell, row);
        }
    }

    UpdateOutcome {
        added: cursor,
        removed: victims.len(),
        shortfall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use margsynth_core::AttributeDomain;
    use ndarray::array;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn beta_balances_simple_move() {
        let synth = array![0.7, 0.3];
        let target = array![0.5, 0.5];
        let search = find_optimal_beta(&synth, &target, &[0], 200.0, 1000);
        assert!(search.converged);
        assert!((search.removed - 200.0).abs() < BETA_TOLERANCE);
    }

    #[test]
    fn beta_saturates_when_over_cells_run_dry() {
        let synth = array![0.6, 0.4];
        let target = array![0.5, 0.5];
        let search = find_optimal_beta(&synth, &target, &[0], 500.0, 1000);
        assert!(!search.converged);
        assert_eq!(search.beta, 1.0);
        assert!((search.removed - 100.0).abs() < 1e-9);
    }

    #[test]
    fn nothing_to_add_means_nothing_removed() {
        let synth = array![0.6, 0.4];
        let target = array![0.5, 0.5];
        let search = find_optimal_beta(&synth, &target, &[0], 0.0, 1000);
        assert!(search.converged);
        assert_eq!(search.beta, 0.0);
    }

    #[test]
    fn plan_classifies_cells() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let synth = array![0.5, 0.0, 0.2, 0.3];
        let target = array![0.25, 0.25, 0.3, 0.2];
        let plan = prepare_update(&synth, &target, 1.0, 100, RoundingMode::Deterministic, &mut rng);
        assert_eq!(plan.zero, vec![(1, 25)]);
        assert_eq!(plan.under, vec![(2, 10)]);
        assert_eq!(plan.total_add(), 35);
        assert!(plan.beta.converged);
        assert_eq!(plan.total_reduce(), 35);
    }

    #[test]
    fn zero_cell_fill_moves_whole_pool() {
        let domain = AttributeDomain::from_sizes(vec![2]).expect("domain");
        let view = MarginalView::from_counts(&domain, &[0], array![0.5, 0.5]).expect("view");
        let mut records = Records::zeros((1000, 1));
        let encoded = view.encode_records(&records);
        let synth = synthetic_distribution(view.domain_size(), &encoded);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let plan = prepare_update(&synth, &view.count, 1.0, 1000, RoundingMode::Deterministic, &mut rng);
        let sorted = SortedCells::new(&encoded);
        let outcome = apply_update(&mut records, &view, &sorted, &plan, 0.5, &mut rng);
        assert_eq!(outcome.added, 500);
        assert_eq!(outcome.shortfall, 0);
        let ones = records.iter().filter(|&&v| v == 1).count();
        assert_eq!(ones, 500);
    }

    #[test]
    fn partial_fill_keeps_other_columns() {
        let domain = AttributeDomain::from_sizes(vec![2, 3]).expect("domain");
        let view = MarginalView::from_counts(&domain, &[0], array![0.5, 0.5]).expect("view");
        let mut records = Records::zeros((10, 2));
        for row in 0..10 {
            records[[row, 1]] = 2;
            records[[row, 0]] = u32::from(row < 2);
        }
        let encoded = view.encode_records(&records);
        let synth = synthetic_distribution(2, &encoded);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let plan = prepare_update(&synth, &view.count, 1.0, 10, RoundingMode::Deterministic, &mut rng);
        let sorted = SortedCells::new(&encoded);
        apply_update(&mut records, &view, &sorted, &plan, 0.0, &mut rng);
        assert!(records.column(1).iter().all(|&v| v == 2));
        assert_eq!(records.column(0).iter().filter(|&&v| v == 1).count(), 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn beta_search_balances_mass(
            raw_synth in proptest::collection::vec(0.01f64..1.0, 2..12),
            raw_target in proptest::collection::vec(0.0f64..1.0, 12),
            alpha in 0.1f64..1.0,
            n in 10usize..5000,
        ) {
            let cells = raw_synth.len();
            let mut synth = Counts::from_vec(raw_synth);
            let mut target = Counts::from_vec(raw_target[..cells].to_vec());
            margsynth_core::normalize_to_distribution(&mut synth);
            margsynth_core::normalize_to_distribution(&mut target);

            let nf = n as f64;
            let mut added = 0.0;
            let mut over = Vec::new();
            for cell in 0..cells {
                let (s, t) = (synth[cell], target[cell]);
                if s < t {
                    added += ((t - s) / s).min(alpha).min(1.0) * s * nf;
                } else if s > t {
                    over.push(cell);
                }
            }
            let search = find_optimal_beta(&synth, &target, &over, added, n);
            prop_assert!((0.0..=1.0).contains(&search.beta));
            prop_assert!((search.removed - added).abs() < BETA_TOLERANCE);
        }
    }
}
