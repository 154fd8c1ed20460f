//! Iterative record synthesis toward a set of target marginals.

use std::fmt;

use margsynth_core::{
    apportion, l1_distance, random_records, AttributeDomain, Counts, MarginalView, Records, Result,
    RoundingMode, SortedCells, SynthError,
};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::update::{apply_update, prepare_update, synthetic_distribution, UpdateOutcome};

/// Complete/partial replacement ratio by iteration parity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitSchedule {
    /// Share of each under-cell's additions copied as whole rows on even iterations.
    pub even_complete_ratio: f64,
    /// Share copied as whole rows on odd iterations.
    pub odd_complete_ratio: f64,
}

impl Default for SplitSchedule {
    fn default() -> Self {
        Self {
            even_complete_ratio: 0.5,
            odd_complete_ratio: 1.0,
        }
    }
}

impl SplitSchedule {
    /// Complete-replacement ratio for `iteration`.
    pub fn complete_ratio(&self, iteration: usize) -> f64 {
        if iteration % 2 == 0 {
            self.even_complete_ratio
        } else {
            self.odd_complete_ratio
        }
    }
}

/// Settings for [`RecordSynthesizer`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynthesizerConfig {
    /// Number of update iterations.
    pub update_iterations: usize,
    /// Rounding of fractional record amounts.
    pub rounding: RoundingMode,
    /// Factor applied to the add rate every `alpha_step` iterations.
    pub alpha_decay: f64,
    /// Iterations between add-rate decays.
    pub alpha_step: usize,
    /// Complete/partial replacement split.
    pub split: SplitSchedule,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            update_iterations: 60,
            rounding: RoundingMode::Deterministic,
            alpha_decay: 0.84,
            alpha_step: 20,
            split: SplitSchedule::default(),
        }
    }
}

impl SynthesizerConfig {
    /// Set the iteration budget.
    pub fn with_update_iterations(mut self, iterations: usize) -> Self {
        self.update_iterations = iterations;
        self
    }

    /// Set the rounding mode.
    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    /// Set the complete/partial split.
    pub fn with_split(mut self, split: SplitSchedule) -> Self {
        self.split = split;
        self
    }

    /// Annealed add rate at `iteration`.
    pub fn alpha(&self, iteration: usize) -> f64 {
        self.alpha_decay.powi((iteration / self.alpha_step.max(1)) as i32)
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha_decay > 0.0 && self.alpha_decay <= 1.0) {
            return Err(SynthError::config("alpha_decay must be in (0, 1]"));
        }
        if self.alpha_step == 0 {
            return Err(SynthError::config("alpha_step must be positive"));
        }
        for ratio in [self.split.even_complete_ratio, self.split.odd_complete_ratio] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(SynthError::config("complete ratios must be in [0, 1]"));
            }
        }
        Ok(())
    }
}

/// How the record pool is seeded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Initialization {
    /// Every attribute uniform over its domain.
    #[default]
    Random,
    /// Attributes with a one-way target follow it exactly (up to rounding).
    Singletons,
}

impl fmt::Display for Initialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initialization::Random => write!(f, "random"),
            Initialization::Singletons => write!(f, "singletons"),
        }
    }
}

/// Build an initial record pool.
///
/// With [`Initialization::Singletons`], each attribute covered by a one-way
/// view gets its values apportioned from that view and shuffled; the other
/// attributes are drawn uniformly.
pub fn initial_records<R: Rng + ?Sized>(
    domain: &AttributeDomain,
    views: &[MarginalView],
    num_records: usize,
    init: Initialization,
    rng: &mut R,
) -> Records {
    let mut records = random_records(domain, num_records, rng);
    if init == Initialization::Singletons {
        for view in views.iter().filter(|v| v.arity() == 1) {
            let attr = view.attributes_index()[0];
            let target = view.normalized_counts();
            let parts = apportion(target.as_slice().unwrap_or(&[]), num_records);
            let mut column: Vec<u32> = parts
                .iter()
                .enumerate()
                .flat_map(|(value, &k)| std::iter::repeat(value as u32).take(k))
                .collect();
            if column.len() != num_records {
                continue;
            }
            column.shuffle(rng);
            for (row, value) in column.into_iter().enumerate() {
                records[[row, attr]] = value;
            }
        }
    }
    records
}

/// Per-iteration L1 errors of every target view.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorTracker {
    history: Vec<Vec<f64>>,
}

impl ErrorTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row of errors.
    pub fn record(&mut self, errors: Vec<f64>) {
        self.history.push(errors);
    }

    /// Rows recorded so far; the first is the initial pool.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// All rows.
    pub fn history(&self) -> &[Vec<f64>] {
        &self.history
    }

    /// The most recent row.
    pub fn latest(&self) -> Option<&[f64]> {
        self.history.last().map(Vec::as_slice)
    }

    /// Error trajectory of one view.
    pub fn view_history(&self, view: usize) -> Vec<f64> {
        self.history
            .iter()
            .filter_map(|row| row.get(view).copied())
            .collect()
    }

    /// Mean error of the most recent row.
    pub fn mean_latest(&self) -> Option<f64> {
        self.latest()
            .filter(|row| !row.is_empty())
            .map(|row| row.iter().sum::<f64>() / row.len() as f64)
    }
}

/// Lifecycle of a [`RecordSynthesizer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthesizerState {
    /// Pool seeded, no update applied yet.
    Initialized,
    /// `iteration` updates have been applied.
    Updating {
        /// Completed iterations.
        iteration: usize,
    },
    /// Iteration budget exhausted; the pool is final.
    Finalized,
}

/// Moves a fixed-size record pool toward a set of target views.
#[derive(Debug)]
pub struct RecordSynthesizer<R: Rng> {
    views: Vec<MarginalView>,
    targets: Vec<Counts>,
    records: Records,
    config: SynthesizerConfig,
    rng: R,
    state: SynthesizerState,
    tracker: ErrorTracker,
}

impl<R: Rng> RecordSynthesizer<R> {
    /// Seed a pool of `num_records` records over `domain`.
    pub fn new(
        domain: &AttributeDomain,
        views: Vec<MarginalView>,
        num_records: usize,
        init: Initialization,
        config: SynthesizerConfig,
        mut rng: R,
    ) -> Result<Self> {
        let records = initial_records(domain, &views, num_records, init, &mut rng);
        Self::with_records(views, records, config, rng)
    }

    /// Start from an existing record pool.
    pub fn with_records(
        views: Vec<MarginalView>,
        records: Records,
        config: SynthesizerConfig,
        rng: R,
    ) -> Result<Self> {
        config.validate()?;
        let width = records.ncols();
        for view in &views {
            if let Some(&attr) = view.attributes_index().iter().find(|&&a| a >= width) {
                return Err(SynthError::config(format!(
                    "view over attributes {:?} references column {attr} of a {width}-column pool",
                    view.attributes_index()
                )));
            }
            for (&attr, &size) in view.attributes_index().iter().zip(view.attribute_sizes()) {
                if let Some(&value) = records.column(attr).iter().find(|&&v| v as usize >= size) {
                    return Err(SynthError::config(format!(
                        "pool column {attr} holds value {value}, outside a domain of size {size}"
                    )));
                }
            }
        }
        let targets = views.iter().map(MarginalView::normalized_counts).collect();
        let mut synth = Self {
            views,
            targets,
            records,
            config,
            rng,
            state: SynthesizerState::Initialized,
            tracker: ErrorTracker::new(),
        };
        let initial = synth.current_errors();
        synth.tracker.record(initial);
        Ok(synth)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SynthesizerState {
        self.state
    }

    /// The live record pool.
    pub fn records(&self) -> &Records {
        &self.records
    }

    /// Target views.
    pub fn views(&self) -> &[MarginalView] {
        &self.views
    }

    /// Error history.
    pub fn tracker(&self) -> &ErrorTracker {
        &self.tracker
    }

    /// Settings in use.
    pub fn config(&self) -> &SynthesizerConfig {
        &self.config
    }

    fn view_error(&self, index: usize) -> f64 {
        let view = &self.views[index];
        let encoded = view.encode_records(&self.records);
        let synth = synthetic_distribution(view.domain_size(), &encoded);
        l1_distance(&synth, &self.targets[index])
    }

    /// L1 error of every view against the live pool.
    pub fn current_errors(&self) -> Vec<f64> {
        (0..self.views.len()).map(|i| self.view_error(i)).collect()
    }

    fn completed_iterations(&self) -> usize {
        match self.state {
            SynthesizerState::Initialized => 0,
            SynthesizerState::Updating { iteration } => iteration,
            SynthesizerState::Finalized => self.config.update_iterations,
        }
    }

    /// Run one update iteration over all views, worst error first.
    pub fn step(&mut self) -> Result<()> {
        if self.state == SynthesizerState::Finalized {
            return Err(SynthError::invalid("synthesizer already finalized"));
        }
        let iteration = self.completed_iterations();
        let num_records = self.records.nrows();
        let alpha = self.config.alpha(iteration);
        let complete_ratio = self.config.split.complete_ratio(iteration);

        let mut errors = self.tracker.latest().map(<[f64]>::to_vec).unwrap_or_default();
        if errors.len() != self.views.len() {
            errors = self.current_errors();
        }
        let mut order: Vec<usize> = (0..self.views.len()).collect();
        order.sort_by(|&a, &b| {
            errors[b]
                .partial_cmp(&errors[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut moved = UpdateOutcome::default();
        if num_records > 0 {
            for &index in &order {
                let view = &self.views[index];
                let encoded = view.encode_records(&self.records);
                let synth = synthetic_distribution(view.domain_size(), &encoded);
                let plan = prepare_update(
                    &synth,
                    &self.targets[index],
                    alpha,
                    num_records,
                    self.config.rounding,
                    &mut self.rng,
                );
                let sorted = SortedCells::new(&encoded);
                let outcome = apply_update(
                    &mut self.records,
                    view,
                    &sorted,
                    &plan,
                    complete_ratio,
                    &mut self.rng,
                );
                moved.added += outcome.added;
                moved.removed += outcome.removed;
                moved.shortfall += outcome.shortfall;
                errors[index] = self.view_error(index);
            }
        }

        let mean = if errors.is_empty() {
            0.0
        } else {
            errors.iter().sum::<f64>() / errors.len() as f64
        };
        let worst = errors.iter().copied().fold(0.0, f64::max);
        debug!(
            iteration,
            alpha,
            mean_error = mean,
            max_error = worst,
            added = moved.added,
            shortfall = moved.shortfall,
            "synthesis iteration"
        );
        self.tracker.record(errors);

        let done = iteration + 1;
        self.state = if done >= self.config.update_iterations {
            SynthesizerState::Finalized
        } else {
            SynthesizerState::Updating { iteration: done }
        };
        Ok(())
    }

    /// Run the remaining iterations of the budget.
    pub fn run(&mut self) -> Result<()> {
        if self.config.update_iterations == 0 {
            self.state = SynthesizerState::Finalized;
        }
        while self.state != SynthesizerState::Finalized {
            self.step()?;
        }
        Ok(())
    }

    /// Consume the synthesizer, returning the pool and its error history.
    pub fn finish(self) -> (Records, ErrorTracker) {
        (self.records, self.tracker)
    }
}
