//! Reconciliation of noisy marginals over overlapping attribute subsets.
//!
//! Views measured independently disagree on the projections they share. For
//! every attribute subset `T` contained in at least two views, the views'
//! projections onto `T` are replaced by their weighted average, and each view
//! absorbs the correction spread uniformly over the cells mapping to each
//! `T`-cell. Subsets are processed smallest first (starting with the empty
//! subset, so that totals agree); a superset correction leaves the projections
//! onto its own subsets unchanged.

use std::collections::BTreeSet;

use margsynth_core::{normalize_to_distribution, sanitize, Counts, MarginalView, Result, SynthError};
use tracing::{debug, info, warn};

/// Settings for [`Reconciler`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconcilerConfig {
    /// Maximum number of consistency + clamp rounds.
    pub max_rounds: usize,
    /// Largest tolerated disagreement between shared projections.
    pub tolerance: f64,
    /// Rescale every view to a probability distribution at the end.
    pub normalize: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_rounds: 50,
            tolerance: 1e-6,
            normalize: true,
        }
    }
}

impl ReconcilerConfig {
    /// Set the round cap.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set the consistency tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Enable or disable the final normalization.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(SynthError::config("reconciler needs at least one round"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(SynthError::config("reconciler tolerance must be >= 0"));
        }
        Ok(())
    }
}

/// Summary of a reconciliation run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconcileReport {
    /// Rounds executed.
    pub rounds: usize,
    /// Number of shared subsets reconciled each round.
    pub subsets: usize,
    /// Largest remaining disagreement between shared projections.
    pub residual: f64,
    /// Whether the residual fell within tolerance.
    pub converged: bool,
}

/// Forces a family of views to agree on every shared projection.
#[derive(Clone, Debug, Default)]
pub struct Reconciler {
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler.
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Reconcile `views` in-place.
    ///
    /// Each round makes every shared projection single-valued and then clamps
    /// negative mass. Rounds repeat while the clamp reintroduces disagreement
    /// above tolerance, up to the configured cap.
    pub fn reconcile(&self, views: &mut [MarginalView]) -> Result<ReconcileReport> {
        self.config.validate()?;
        for view in views.iter_mut() {
            sanitize(&mut view.count);
        }

        let subsets = shared_subsets(views);
        let mut rounds = 0usize;
        let mut residual = 0.0;
        let mut converged = false;
        while rounds < self.config.max_rounds {
            rounds += 1;
            for subset in &subsets {
                consist_on_subset(views, subset)?;
            }
            for view in views.iter_mut() {
                rebalance_negative_mass(&mut view.count);
            }
            residual = inconsistency_over(views, &subsets)?;
            debug!(round = rounds, residual, "reconciliation round");
            if residual <= self.config.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                rounds,
                residual,
                tolerance = self.config.tolerance,
                "reconciliation stopped above tolerance"
            );
        }
        if self.config.normalize {
            normalize_views(views);
        }
        info!(
            views = views.len(),
            subsets = subsets.len(),
            rounds,
            residual,
            "reconciled marginals"
        );
        Ok(ReconcileReport {
            rounds,
            subsets: subsets.len(),
            residual,
            converged,
        })
    }
}

fn intersect(a: &[usize], b: &[usize]) -> Vec<usize> {
    a.iter().filter(|x| b.binary_search(x).is_ok()).copied().collect()
}

/// Attribute subsets shared by at least two views, smallest first.
///
/// This is the closure of the views' attribute sets under intersection,
/// always including the empty subset when there are two or more views.
pub fn shared_subsets(views: &[MarginalView]) -> Vec<Vec<usize>> {
    if views.len() < 2 {
        return Vec::new();
    }
    let bases: Vec<&[usize]> = views.iter().map(|v| v.attributes_index()).collect();

    let mut found: BTreeSet<Vec<usize>> = BTreeSet::new();
    let mut frontier: Vec<Vec<usize>> = vec![Vec::new()];
    for i in 0..bases.len() {
        for j in (i + 1)..bases.len() {
            frontier.push(intersect(bases[i], bases[j]));
        }
    }
    while let Some(subset) = frontier.pop() {
        if !found.insert(subset.clone()) {
            continue;
        }
        for base in &bases {
            let next = intersect(&subset, base);
            if !found.contains(&next) {
                frontier.push(next);
            }
        }
    }

    let mut out: Vec<Vec<usize>> = found
        .into_iter()
        .filter(|s| views.iter().filter(|v| v.contains(s)).count() >= 2)
        .collect();
    out.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    out
}

fn bincount(index: &[usize], weights: &Counts, len: usize) -> Counts {
    let mut out = Counts::zeros(len);
    for (cell, &small) in index.iter().enumerate() {
        out[small] += weights[cell];
    }
    out
}

/// Make the projections onto `subset` agree across all views containing it.
///
/// Returns `false` when fewer than two views contain the subset or their
/// weights sum to zero, in which case nothing is changed.
pub fn consist_on_subset(views: &mut [MarginalView], subset: &[usize]) -> Result<bool> {
    let containing: Vec<usize> = views
        .iter()
        .enumerate()
        .filter(|(_, v)| v.contains(subset))
        .map(|(i, _)| i)
        .collect();
    if containing.len() < 2 {
        return Ok(false);
    }

    let common = views[containing[0]].sub_view(subset)?;
    let cells = common.domain_size();
    let mut target = Counts::zeros(cells);
    let mut total_weight = 0.0;
    let mut parts = Vec::with_capacity(containing.len());
    for &i in &containing {
        let view = &views[i];
        let index = common.projection_index(view)?;
        let projection = bincount(&index, &view.count, cells);
        let spread = (view.domain_size() / cells) as f64;
        let weight = view.weight_coeff / spread;
        if weight.is_finite() && weight > 0.0 {
            target.scaled_add(weight, &projection);
            total_weight += weight;
        }
        parts.push((i, index, projection, spread));
    }
    if total_weight <= 0.0 || !total_weight.is_finite() {
        return Ok(false);
    }
    target.mapv_inplace(|x| x / total_weight);

    for (i, index, projection, spread) in parts {
        let delta = (&target - &projection) / spread;
        let count = &mut views[i].count;
        for (cell, &small) in index.iter().enumerate() {
            count[cell] += delta[small];
        }
    }
    Ok(true)
}

/// Zero out negative cells and charge the removed mass to the smallest positive cells.
///
/// Positive cells are consumed in ascending order (ties by index) until the
/// negative mass is paid for; the cell that crosses the threshold keeps its
/// remainder. Total mass is preserved unless the negative mass exceeds the
/// positive mass, in which case every cell becomes zero.
pub fn rebalance_negative_mass(count: &mut Counts) {
    let mut negative_total = 0.0;
    for x in count.iter_mut() {
        if *x < 0.0 {
            negative_total -= *x;
            *x = 0.0;
        }
    }
    if negative_total == 0.0 {
        return;
    }

    let mut positive: Vec<usize> = (0..count.len()).filter(|&i| count[i] > 0.0).collect();
    positive.sort_by(|&a, &b| {
        count[a]
            .partial_cmp(&count[b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut cumulative = 0.0;
    for &i in &positive {
        cumulative += count[i];
        if cumulative > negative_total {
            count[i] = cumulative - negative_total;
            return;
        }
        count[i] = 0.0;
    }
}

/// Rescale every view to a probability distribution.
pub fn normalize_views(views: &mut [MarginalView]) {
    for view in views.iter_mut() {
        normalize_to_distribution(&mut view.count);
    }
}

fn inconsistency_over(views: &[MarginalView], subsets: &[Vec<usize>]) -> Result<f64> {
    let mut worst = 0.0f64;
    for subset in subsets {
        let mut first: Option<Counts> = None;
        for view in views.iter().filter(|v| v.contains(subset)) {
            let common = view.sub_view(subset)?;
            let projection = common.project_counts(view)?;
            match &first {
                None => first = Some(projection),
                Some(reference) => {
                    for (a, b) in reference.iter().zip(projection.iter()) {
                        worst = worst.max((a - b).abs());
                    }
                }
            }
        }
    }
    Ok(worst)
}

/// Largest disagreement between any two views on any shared projection.
pub fn max_inconsistency(views: &[MarginalView]) -> Result<f64> {
    inconsistency_over(views, &shared_subsets(views))
}
