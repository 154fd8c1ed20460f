use margsynth::prelude::*;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn main() {
    init_tracing();

    let domain = AttributeDomain::new(
        vec!["county", "quarter", "age", "income", "tenure"],
        vec![4, 2, 5, 4, 3],
    )
    .expect("domain");

    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let n = 20_000;
    let mut private = Records::zeros((n, domain.len()));
    for row in 0..n {
        let county = rng.gen_range(0..4u32);
        let age = rng.gen_range(0..5u32);
        let income = (age.min(3) + rng.gen_range(0..2u32)).min(3);
        let tenure = if income >= 2 { rng.gen_range(1..3u32) } else { rng.gen_range(0..2u32) };
        private[[row, 0]] = county;
        private[[row, 1]] = rng.gen_range(0..2u32);
        private[[row, 2]] = age;
        private[[row, 3]] = income;
        private[[row, 4]] = tenure;
    }
    let source = RecordTableSource::new(domain.clone(), private).expect("source");

    let plan = MeasurementPlan::standard(&domain, vec![0, 1]);
    let config = SynthesisConfig::default()
        .with_seed(7)
        .with_stratum_granularity(5)
        .with_initialization(Initialization::Singletons);
    let table = Orchestrator::new(domain, plan, config, &source)
        .synthesize(1.0, 1e-6, 1.0)
        .expect("synthesis");

    println!("synthetic rows: {}", table.num_rows());
    println!(
        "reconciliation: {} rounds, residual {:.2e}",
        table.reconcile.rounds, table.reconcile.residual
    );
    for block in &table.blocks {
        println!(
            "stratum {:?}: {} rows, mean L1 error {:.4}",
            block.stratum,
            block.rows.len(),
            block.mean_error
        );
    }
}
