use prevalon::bootstrap::{Statistic, TrialTally, run_bootstrap};
use prevalon::cohort::{AgeStratum, Cohort, Patient};
use prevalon::config::SimulationConfig;
use prevalon::interval::{IntervalMethod, summarize};
use prevalon::io::{export_cohort, load_cohort};
use prevalon::pipeline::{Simulation, run_loaded, run_synthetic};
use prevalon::progress::NoopProgress;
use prevalon::risk::{EnabledTerms, RiskTerm};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::tempdir;

fn small_config() -> SimulationConfig {
    SimulationConfig {
        patients: 5_000,
        trials: 40,
        ..SimulationConfig::default()
    }
}

#[test]
fn same_seed_reproduces_the_summary_bit_for_bit() {
    let a = run_synthetic(small_config(), None, &mut NoopProgress).expect("first run");
    let b = run_synthetic(small_config(), None, &mut NoopProgress).expect("second run");

    for (x, y) in a.summary.rows().iter().zip(b.summary.rows()) {
        assert_eq!(x.statistic, y.statistic);
        assert_eq!(x.interval.median.to_bits(), y.interval.median.to_bits());
        assert_eq!(x.interval.lower.to_bits(), y.interval.lower.to_bits());
        assert_eq!(x.interval.upper.to_bits(), y.interval.upper.to_bits());
    }

    let other = SimulationConfig {
        seed: 68,
        ..small_config()
    };
    let c = run_synthetic(other, None, &mut NoopProgress).expect("third run");
    assert_ne!(a.summary, c.summary);
}

#[test]
fn generated_cohort_is_well_formed() {
    let mut simulation = Simulation::new(small_config()).expect("valid configuration");
    let cohort = simulation
        .generate_cohort(&mut NoopProgress)
        .expect("generation");

    assert_eq!(cohort.len(), 5_000);
    let counts = cohort.stratum_counts();
    assert_eq!(counts.iter().sum::<usize>(), cohort.len());
    for patient in &cohort {
        assert!(patient.age <= 99);
        assert!((15.0..=50.0).contains(&patient.bmi_raw));
        assert!((0.0..=1.0).contains(&patient.risk_assessment));
        let profile = patient.profile.as_ref().expect("synthetic profile");
        assert_eq!(profile.features.len(), RiskTerm::ALL.len());
    }
    // Elderly patients carry most of the modeled risk.
    let mean_risk = |stratum| {
        let (sum, n) = cohort
            .stratum(stratum)
            .fold((0.0, 0usize), |(s, n), p| (s + p.risk_assessment, n + 1));
        sum / n as f64
    };
    assert!(mean_risk(AgeStratum::From55) > mean_risk(AgeStratum::Under25));
}

#[test]
fn exported_cohort_reloads_and_bootstraps_identically() {
    let dir = tempdir().expect("temporary directory");
    let cohort_path = dir.path().join("cohort.csv");

    let mut simulation = Simulation::new(small_config()).expect("valid configuration");
    let cohort = simulation
        .generate_cohort(&mut NoopProgress)
        .expect("generation");
    export_cohort(&cohort, &cohort_path).expect("export");

    let loaded = load_cohort(&cohort_path).expect("load");
    assert_eq!(loaded.len(), cohort.len());
    for (a, b) in cohort.iter().zip(loaded.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.age, b.age);
        assert_eq!(a.bmi_raw.to_bits(), b.bmi_raw.to_bits());
        assert_eq!(a.risk_assessment.to_bits(), b.risk_assessment.to_bits());
        assert_eq!(a.has_condition, b.has_condition);
    }

    let mut original = run_bootstrap(
        &cohort,
        40,
        &mut StdRng::seed_from_u64(9),
        &mut NoopProgress,
    )
    .expect("bootstrap of generated cohort");
    let mut reloaded = run_bootstrap(
        &loaded,
        40,
        &mut StdRng::seed_from_u64(9),
        &mut NoopProgress,
    )
    .expect("bootstrap of reloaded cohort");
    let estimator = IntervalMethod::OrderStatistic.estimator();
    assert_eq!(
        summarize(&mut original, estimator).expect("summary"),
        summarize(&mut reloaded, estimator).expect("summary")
    );

    let outcome = run_loaded(small_config(), &cohort_path, &mut NoopProgress).expect("run");
    assert_eq!(outcome.cohort_size, cohort.len());
}

#[test]
fn elderly_only_cohort_leaves_younger_strata_undefined() {
    let patients: Vec<Patient> = (0..1000u32)
        .map(|i| Patient::loaded(format!("P{i}"), 55 + i % 45, 28.0, 0.05, i < 50))
        .collect();
    let cohort = Cohort::new(patients);

    let stats = TrialTally::from_resample(cohort.iter()).statistics();
    assert_eq!(stats.get(Statistic::Prevalence), 0.05);
    assert_eq!(stats.get(Statistic::Prevalence55Plus), 0.05);
    assert!(stats.get(Statistic::PrevalenceUnder25).is_nan());
    assert!(stats.get(Statistic::Prevalence25To54).is_nan());

    let mut distributions = run_bootstrap(
        &cohort,
        40,
        &mut StdRng::seed_from_u64(67),
        &mut NoopProgress,
    )
    .expect("bootstrap");
    let table = summarize(
        &mut distributions,
        IntervalMethod::OrderStatistic.estimator(),
    )
    .expect("summary");
    let elderly = table.get(Statistic::Prevalence55Plus);
    assert!(elderly.lower <= elderly.median && elderly.median <= elderly.upper);
    assert!(table.get(Statistic::PrevalenceUnder25).median.is_nan());
}

#[test]
fn ablating_genetics_lowers_average_risk() {
    let full = run_synthetic(small_config(), None, &mut NoopProgress).expect("full model");
    let ablated = SimulationConfig {
        enabled_terms: EnabledTerms::only([
            RiskTerm::Baseline,
            RiskTerm::SmokingInteraction,
            RiskTerm::Age,
            RiskTerm::Bmi,
        ]),
        ..small_config()
    };
    let ablated = run_synthetic(ablated, None, &mut NoopProgress).expect("ablated model");
    assert!(
        ablated.summary.get(Statistic::AverageRisk).median
            < full.summary.get(Statistic::AverageRisk).median
    );
}

#[test]
fn configuration_file_drives_the_run() {
    let dir = tempdir().expect("temporary directory");
    let config_path = dir.path().join("run.toml");
    std::fs::write(
        &config_path,
        "patients = 3000\ntrials = 20\nseed = 7\ninterval = \"interpolated\"\npartitions = 2\n",
    )
    .expect("write config");

    let config = SimulationConfig::load(&config_path).expect("load config");
    assert_eq!(config.partitions, 2);
    let outcome = run_synthetic(config, None, &mut NoopProgress).expect("run");
    assert_eq!(outcome.cohort_size, 3_000);
}
