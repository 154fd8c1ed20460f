//! End-to-end synthesis: measure, reconcile, then synthesize every stratum.

use std::ops::Range;

use margsynth_accounting::{BudgetAllocation, PrivacyParams, STRATUM_GROUP};
use margsynth_core::{
    round_to_granularity, AttributeDomain, MarginalView, NoiseMechanism, Records, Result,
    SynthError,
};
use margsynth_engine::{normalize_views, refine, ReconcileReport, Reconciler, RecordSynthesizer};
use margsynth_prng::SeedKey;
use ndarray::{ArrayView1, ArrayView2, Axis, Slice};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::SynthesisConfig;
use crate::plan::MeasurementPlan;
use crate::source::MarginalSource;

// Top-level streams derived from the master seed.
const MEASURE_STREAM: u64 = 0;
const SYNTH_STREAM: u64 = 1;
// Per-stratum streams.
const POOL_STREAM: u64 = 0;
const REFINE_STREAM: u64 = 1;

/// A noisy marginal taken from the private source.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    /// Budget group.
    pub group: String,
    /// Attribute names of the marginal.
    pub label: String,
    /// Noise applied.
    pub mechanism: NoiseMechanism,
}

/// Rows of one stratum within a [`SyntheticTable`].
#[derive(Clone, Debug, PartialEq)]
pub struct StratumBlock {
    /// Values of the stratum attributes, in `stratum_attributes` order.
    pub stratum: Vec<u32>,
    /// Row range in the table.
    pub rows: Range<usize>,
    /// Mean L1 error of the stratum's targets after the last iteration.
    pub mean_error: f64,
}

/// Output of a synthesis run.
#[derive(Clone, Debug)]
pub struct SyntheticTable {
    /// Column names, one per attribute.
    pub attribute_names: Vec<String>,
    /// Columns identifying a stratum, ascending.
    pub stratum_attributes: Vec<usize>,
    /// One coded row per synthetic record, grouped by stratum.
    pub records: Records,
    /// Index into `blocks` for every row.
    pub stratum_of_row: Vec<usize>,
    /// Strata in output order.
    pub blocks: Vec<StratumBlock>,
    /// Marginals measured for this run.
    pub measurements: Vec<Measurement>,
    /// Reconciliation summary.
    pub reconcile: ReconcileReport,
}

impl SyntheticTable {
    /// Number of synthetic records.
    pub fn num_rows(&self) -> usize {
        self.records.nrows()
    }

    /// The column called `name`.
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, u32>> {
        let index = self.attribute_names.iter().position(|n| n == name)?;
        Some(self.records.column(index))
    }

    /// Records of block `index`.
    pub fn block_records(&self, index: usize) -> Option<ArrayView2<'_, u32>> {
        let block = self.blocks.get(index)?;
        Some(self.records.slice_axis(Axis(0), Slice::from(block.rows.clone())))
    }
}

struct StratumTask {
    ordinal: usize,
    values: Vec<u32>,
    target: usize,
}

/// Coordinates measurement, reconciliation and per-stratum synthesis.
pub struct Orchestrator<'a> {
    domain: AttributeDomain,
    plan: MeasurementPlan,
    config: SynthesisConfig,
    private: &'a dyn MarginalSource,
    public: Option<&'a dyn MarginalSource>,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator over the private source.
    pub fn new(
        domain: AttributeDomain,
        plan: MeasurementPlan,
        config: SynthesisConfig,
        private: &'a dyn MarginalSource,
    ) -> Self {
        Self {
            domain,
            plan,
            config,
            private,
            public: None,
        }
    }

    /// Blend every measurement with the same marginal of `public`.
    pub fn with_public(mut self, public: &'a dyn MarginalSource) -> Self {
        self.public = Some(public);
        self
    }

    /// The attribute catalog.
    pub fn domain(&self) -> &AttributeDomain {
        &self.domain
    }

    /// The measurement plan.
    pub fn plan(&self) -> &MeasurementPlan {
        &self.plan
    }

    /// The run configuration.
    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Measure every planned marginal, stratum marginal first.
    ///
    /// Each view's `weight_coeff` is its inverse noise variance relative to
    /// the least noisy measurement. With a public source and a positive
    /// public weight, counts and weights are blended with the public
    /// marginal rescaled to the noisy total.
    pub fn measure(
        &self,
        allocation: &BudgetAllocation,
    ) -> Result<(Vec<MarginalView>, Vec<Measurement>)> {
        let mut rng = SeedKey::new(self.config.seed)
            .fold_in(MEASURE_STREAM)
            .to_rng();
        let mut groups: Vec<(&str, &[Vec<usize>])> = Vec::with_capacity(self.plan.groups.len() + 1);
        let stratum = [self.plan.stratum_attributes.clone()];
        groups.push((STRATUM_GROUP, stratum.as_slice()));
        groups.extend(
            self.plan
                .groups
                .iter()
                .map(|g| (g.name.as_str(), g.subsets.as_slice())),
        );

        let mut views = Vec::with_capacity(self.plan.num_measurements() + 1);
        let mut variances = Vec::with_capacity(views.capacity());
        let mut measurements = Vec::with_capacity(views.capacity());
        for (group, subsets) in groups {
            let calibration = allocation.calibrate(group, subsets.len())?;
            debug!(
                group,
                marginals = subsets.len(),
                mechanism = calibration.mechanism.name(),
                std_dev = calibration.mechanism.std_dev(),
                "measuring group"
            );
            for subset in subsets {
                let raw = self.private.raw_counts(subset)?;
                let mut view = MarginalView::from_counts(&self.domain, subset, raw)?;
                calibration.mechanism.apply(&mut view.count, &mut rng);
                measurements.push(Measurement {
                    group: group.to_string(),
                    label: view.label(&self.domain),
                    mechanism: calibration.mechanism,
                });
                variances.push(calibration.mechanism.variance());
                views.push(view);
            }
        }

        let floor = variances.iter().copied().fold(f64::INFINITY, f64::min);
        for (view, variance) in views.iter_mut().zip(variances.iter()) {
            view.weight_coeff = if *variance > 0.0 { floor / variance } else { 1.0 };
        }

        let weight = self.config.public_weight;
        if let Some(public) = self.public.filter(|_| weight > 0.0) {
            for view in views.iter_mut() {
                let raw = public.raw_counts(view.attributes_index())?;
                let public_view = MarginalView::from_counts(&self.domain, view.attributes_index(), raw)?;
                let public_total = public_view.total();
                if public_total <= 0.0 {
                    continue;
                }
                let scale = view.total().max(0.0) / public_total;
                view.count = &public_view.count * (weight * scale) + &view.count * (1.0 - weight);
                view.weight_coeff = weight + (1.0 - weight) * view.weight_coeff;
            }
        }
        Ok((views, measurements))
    }

    fn stratum_tasks(&self, stratum_view: &MarginalView) -> Vec<StratumTask> {
        let granularity = self.config.stratum_granularity;
        (0..stratum_view.domain_size())
            .filter_map(|cell| {
                let target = round_to_granularity(stratum_view.count[cell], granularity);
                if target == 0 {
                    debug!(stratum = cell, "stratum has no records");
                    return None;
                }
                Some(StratumTask {
                    ordinal: cell,
                    values: stratum_view.decode(cell),
                    target,
                })
            })
            .collect()
    }

    /// Run the full pipeline under a total `(epsilon, delta)` budget.
    pub fn synthesize(&self, epsilon: f64, delta: f64, sensitivity: f64) -> Result<SyntheticTable> {
        self.config.validate()?;
        self.plan.validate(&self.domain)?;
        let params = PrivacyParams::new(epsilon, delta, sensitivity)?;
        let allocation = BudgetAllocation::new(params, &self.config.policy)?;

        let (mut views, measurements) = self.measure(&allocation)?;
        let reconciler = Reconciler::new(self.config.reconciler.with_normalize(false));
        let report = reconciler.reconcile(&mut views)?;
        let stratum_view = views
            .first()
            .ok_or_else(|| SynthError::invalid("no stratum marginal was measured"))?;
        let tasks = self.stratum_tasks(stratum_view);
        let stratum_attributes = stratum_view.attributes_index().to_vec();
        normalize_views(&mut views);

        let synth_key = SeedKey::new(self.config.seed).fold_in(SYNTH_STREAM);
        let domain = &self.domain;
        let config = &self.config;
        let strata = &stratum_attributes;
        let shared = &views;
        let blocks: Vec<(Vec<u32>, Records, f64)> = tasks
            .into_par_iter()
            .map(|task| {
                synthesize_stratum(domain, config, strata, shared, task, synth_key)
            })
            .collect::<Result<Vec<_>>>()?;

        let total: usize = blocks.iter().map(|(_, records, _)| records.nrows()).sum();
        let mut records = Records::zeros((total, self.domain.len()));
        let mut stratum_of_row = Vec::with_capacity(total);
        let mut out_blocks = Vec::with_capacity(blocks.len());
        let mut offset = 0usize;
        for (index, (stratum, block, mean_error)) in blocks.into_iter().enumerate() {
            let rows = offset..offset + block.nrows();
            records
                .slice_axis_mut(Axis(0), Slice::from(rows.clone()))
                .assign(&block);
            stratum_of_row.extend(std::iter::repeat(index).take(block.nrows()));
            offset = rows.end;
            out_blocks.push(StratumBlock {
                stratum,
                rows,
                mean_error,
            });
        }

        info!(
            rows = total,
            strata = out_blocks.len(),
            epsilon,
            delta,
            converged = report.converged,
            "synthesis complete"
        );
        Ok(SyntheticTable {
            attribute_names: self.domain.names().to_vec(),
            stratum_attributes,
            records,
            stratum_of_row,
            blocks: out_blocks,
            measurements,
            reconcile: report,
        })
    }
}

fn synthesize_stratum(
    domain: &AttributeDomain,
    config: &SynthesisConfig,
    stratum_attributes: &[usize],
    views: &[MarginalView],
    task: StratumTask,
    key: SeedKey,
) -> Result<(Vec<u32>, Records, f64)> {
    let fixed: Vec<(usize, u32)> = stratum_attributes
        .iter()
        .copied()
        .zip(task.values.iter().copied())
        .collect();
    let mut targets = Vec::with_capacity(views.len());
    for view in views {
        let conditional = view.condition_on(&fixed)?;
        if conditional.arity() > 0 && conditional.total() > 0.0 {
            targets.push(conditional);
        }
    }

    let stratum_key = key.fold_in(task.ordinal as u64);
    let pool = config
        .refine
        .as_ref()
        .map_or(task.target, |r| r.pool_size(task.target));
    let mut synth = RecordSynthesizer::new(
        domain,
        targets,
        pool,
        config.initialization,
        config.synthesizer_config(),
        stratum_key.fold_in(POOL_STREAM).to_rng(),
    )?;
    synth.run()?;
    let mean_error = synth.tracker().mean_latest().unwrap_or(0.0);

    let mut records = match &config.refine {
        Some(refine_config) => {
            let mut rng = stratum_key.fold_in(REFINE_STREAM).to_rng();
            let outcome = refine(synth.records(), synth.views(), task.target, refine_config, &mut rng)?;
            debug!(
                stratum = task.ordinal,
                rounds = outcome.rounds,
                score = outcome.score,
                "refined stratum"
            );
            outcome.records
        }
        None => synth.finish().0,
    };
    for &(attr, value) in &fixed {
        records.column_mut(attr).fill(value);
    }

    info!(
        stratum = task.ordinal,
        values = ?task.values,
        records = records.nrows(),
        mean_error,
        "stratum synthesized"
    );
    Ok((task.values, records, mean_error))
}
