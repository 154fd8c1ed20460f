use margsynth::{calibrate, select_mechanism, Composition};

fn main() {
    let epsilon = 1.0;
    let delta = 1e-6;

    for k in [1usize, 10, 100, 1000] {
        println!("k = {k}");
        for composition in [
            Composition::NaiveLaplace,
            Composition::AdvancedLaplace,
            Composition::AdvancedGaussian,
            Composition::ZcdpGaussian,
        ] {
            let calibration = calibrate(composition, epsilon, delta, 1.0, k).expect("calibration");
            println!(
                "  {composition:>18}: {:<8} std dev {:.3}",
                calibration.mechanism.name(),
                calibration.mechanism.std_dev()
            );
        }
        let best = select_mechanism(epsilon, delta, 1.0, k).expect("selection");
        println!("  selected: {}", best.composition);
    }
}
