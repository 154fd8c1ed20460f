use margsynth::prelude::*;
use margsynth::{SynthError, STRATUM_GROUP, TWO_WAY_GROUP};
use ndarray::array;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn survey_domain() -> AttributeDomain {
    AttributeDomain::new(vec!["region", "age", "employed"], vec![3, 4, 2]).expect("domain")
}

/// Employment follows age; regions are uneven in size.
fn survey_records(n: usize, seed: u64) -> Records {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut records = Records::zeros((n, 3));
    for row in 0..n {
        let region = match rng.gen_range(0..10) {
            0..=4 => 0,
            5..=7 => 1,
            _ => 2,
        };
        let age: u32 = rng.gen_range(0..4);
        let employed = u32::from(rng.gen_bool(if age == 0 || age == 3 { 0.2 } else { 0.8 }));
        records[[row, 0]] = region;
        records[[row, 1]] = age;
        records[[row, 2]] = employed;
    }
    records
}

fn one_way(records: &Records, attr: usize, size: usize) -> Vec<f64> {
    let mut out = vec![0.0; size];
    for &v in records.column(attr) {
        out[v as usize] += 1.0;
    }
    let n = records.nrows().max(1) as f64;
    out.iter().map(|c| c / n).collect()
}

fn l1(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

#[test]
fn single_stratum_run_tracks_private_marginals() {
    let domain = survey_domain();
    let private = survey_records(3000, 1);
    let source = RecordTableSource::new(domain.clone(), private.clone()).expect("source");
    let plan = MeasurementPlan::standard(&domain, vec![]);
    let config = SynthesisConfig::default().with_seed(7);
    let orchestrator = Orchestrator::new(domain.clone(), plan, config, &source);

    let table = orchestrator.synthesize(50.0, 1e-6, 1.0).expect("synthesis");
    assert_eq!(table.blocks.len(), 1);
    assert!((2900..=3100).contains(&table.num_rows()), "rows = {}", table.num_rows());
    assert!(table.reconcile.converged);
    for (attr, column) in table.records.columns().into_iter().enumerate() {
        assert!(column.iter().all(|&v| (v as usize) < domain.size(attr)));
    }
    for attr in 0..3 {
        let size = domain.size(attr);
        let err = l1(&one_way(&table.records, attr, size), &one_way(&private, attr, size));
        assert!(err < 0.1, "attribute {attr} error {err}");
    }
}

#[test]
fn strata_are_contiguous_and_tagged() {
    let domain = survey_domain();
    let private = survey_records(3000, 2);
    let source = RecordTableSource::new(domain.clone(), private.clone()).expect("source");
    let plan = MeasurementPlan::standard(&domain, vec![0]);
    let config = SynthesisConfig::default()
        .with_seed(3)
        .with_update_iterations(20)
        .with_initialization(Initialization::Singletons);
    let table = Orchestrator::new(domain, plan, config, &source)
        .synthesize(50.0, 1e-6, 1.0)
        .expect("synthesis");

    assert_eq!(table.stratum_attributes, vec![0]);
    assert_eq!(table.blocks.len(), 3);
    assert!(table.stratum_of_row.windows(2).all(|w| w[0] <= w[1]));
    let truth = one_way(&private, 0, 3);
    for (index, block) in table.blocks.iter().enumerate() {
        assert_eq!(block.stratum, vec![index as u32]);
        let rows = table.block_records(index).expect("block");
        assert!(rows.column(0).iter().all(|&v| v == index as u32));
        let share = rows.nrows() as f64 / table.num_rows() as f64;
        assert!((share - truth[index]).abs() < 0.02, "stratum {index} share {share}");
    }
}

#[test]
fn same_seed_reproduces_the_table() {
    let domain = survey_domain();
    let source = RecordTableSource::new(domain.clone(), survey_records(800, 4)).expect("source");
    let run = || {
        let plan = MeasurementPlan::standard(&domain, vec![0]);
        let config = SynthesisConfig::default()
            .with_seed(11)
            .with_update_iterations(10);
        Orchestrator::new(domain.clone(), plan, config, &source)
            .synthesize(2.0, 1e-6, 1.0)
            .expect("synthesis")
    };
    let a = run();
    let b = run();
    assert_eq!(a.records, b.records);
    assert_eq!(a.stratum_of_row, b.stratum_of_row);
    assert_eq!(a.measurements, b.measurements);
}

#[test]
fn granularity_and_refinement_fix_stratum_sizes() {
    let domain = survey_domain();
    let source = RecordTableSource::new(domain.clone(), survey_records(1500, 5)).expect("source");
    let plan = MeasurementPlan::standard(&domain, vec![0]);
    let config = SynthesisConfig::default()
        .with_seed(2)
        .with_update_iterations(8)
        .with_stratum_granularity(10)
        .with_refine(RefineConfig::default().with_pool_factor(1.5));
    let table = Orchestrator::new(domain, plan, config, &source)
        .synthesize(5.0, 1e-6, 1.0)
        .expect("synthesis");
    for block in &table.blocks {
        assert_eq!(block.rows.len() % 10, 0);
    }
    assert_eq!(table.stratum_of_row.len(), table.num_rows());
}

#[test]
fn public_marginals_dominate_at_full_weight() {
    let domain = survey_domain();
    let private = RecordTableSource::new(domain.clone(), survey_records(2000, 6)).expect("source");
    let mut public_records = survey_records(500, 7);
    public_records.column_mut(2).fill(0);
    let public = RecordTableSource::new(domain.clone(), public_records).expect("source");

    let plan = MeasurementPlan::standard(&domain, vec![]);
    let config = SynthesisConfig::default()
        .with_seed(5)
        .with_update_iterations(20)
        .with_public_weight(1.0);
    let table = Orchestrator::new(domain, plan, config, &private)
        .with_public(&public)
        .synthesize(10.0, 1e-6, 1.0)
        .expect("synthesis");
    let employed = table.column("employed").expect("column");
    let zeros = employed.iter().filter(|&&v| v == 0).count() as f64;
    assert!(zeros / table.num_rows() as f64 > 0.95);
}

#[test]
fn mismatched_marginal_names_the_view() {
    let domain = AttributeDomain::new(vec!["age", "sex"], vec![3, 2]).expect("domain");
    let source = PrecomputedSource::new()
        .with_table(&[], array![10.0])
        .with_table(&[0, 1], array![1.0, 2.0, 3.0, 4.0, 5.0]);
    let plan = MeasurementPlan::new(vec![]).with_group(TWO_WAY_GROUP, vec![vec![0, 1]]);
    let config = SynthesisConfig::default().with_policy(
        AllocationPolicy::empty()
            .with_group(STRATUM_GROUP, 1.0, Composition::Auto)
            .with_group(TWO_WAY_GROUP, 1.0, Composition::Auto),
    );
    let err = Orchestrator::new(domain, plan, config, &source)
        .synthesize(1.0, 1e-6, 1.0)
        .expect_err("mismatch");
    assert!(err.is_configuration());
    match err {
        SynthError::DomainMismatch {
            view,
            expected,
            found,
        } => {
            assert_eq!(view, "age,sex");
            assert_eq!(expected, 6);
            assert_eq!(found, 5);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn missing_budget_group_is_a_configuration_error() {
    let domain = survey_domain();
    let source = RecordTableSource::new(domain.clone(), survey_records(100, 8)).expect("source");
    let plan = MeasurementPlan::standard(&domain, vec![]);
    let config = SynthesisConfig::default()
        .with_policy(AllocationPolicy::empty().with_group(STRATUM_GROUP, 1.0, Composition::Auto));
    let err = Orchestrator::new(domain, plan, config, &source)
        .synthesize(1.0, 1e-6, 1.0)
        .expect_err("no one_way budget");
    assert!(err.is_configuration());
}

#[test]
fn invalid_budget_is_rejected() {
    let domain = survey_domain();
    let source = RecordTableSource::new(domain.clone(), survey_records(100, 9)).expect("source");
    let plan = MeasurementPlan::standard(&domain, vec![]);
    let orchestrator = Orchestrator::new(domain, plan, SynthesisConfig::default(), &source);
    assert!(orchestrator.synthesize(0.0, 1e-6, 1.0).is_err());
    assert!(orchestrator.synthesize(1.0, 0.0, 1.0).is_err());
}

#[test]
fn stratum_plus_one_attribute_is_synthesized() {
    let domain = AttributeDomain::new(vec!["region", "employed"], vec![3, 2]).expect("domain");
    let mut private = Records::zeros((600, 2));
    for row in 0..600 {
        private[[row, 0]] = (row % 3) as u32;
        private[[row, 1]] = u32::from(row % 4 == 0);
    }
    let source = RecordTableSource::new(domain.clone(), private).expect("source");
    let plan = MeasurementPlan::standard(&domain, vec![0]);
    assert_eq!(plan.groups.len(), 1);
    let config = SynthesisConfig::default()
        .with_seed(9)
        .with_update_iterations(10);
    let table = Orchestrator::new(domain, plan, config, &source)
        .synthesize(5.0, 1e-6, 1.0)
        .expect("synthesis");
    assert!(!table.blocks.is_empty());
    for (index, block) in table.blocks.iter().enumerate() {
        let rows = table.block_records(index).expect("block");
        assert_eq!(rows.nrows(), block.rows.len());
        assert!(rows.column(0).iter().all(|&v| v == block.stratum[0]));
        assert!(rows.column(1).iter().all(|&v| v < 2));
    }
    assert_eq!(table.stratum_of_row.len(), table.num_rows());
}
