// ========================================================================================
//
//                              THE BOOTSTRAP ENGINE
//
// ========================================================================================
//
// ### Purpose ###
//
// Each trial resamples the cohort with replacement (N draws from N patients),
// tallies the resample in one pass, and appends the trial's 13 summary values
// to their distributions. Resamples are streamed straight into the tally and
// never materialized; the cohort itself is only ever borrowed.
//
// ### Randomness ###
//
// Sequential mode consumes the caller's generator: trial order, then
// resample-index order within a trial. Partitioned mode derives one seed per
// partition from the caller's generator (in partition order) and runs each
// partition on its own stream, so its results are reproducible for a given
// seed and partition count but are not the sequential results.

use crate::cohort::{AgeStratum, Cohort, Patient};
use crate::progress::{ProgressObserver, SimulationStage};
use log::{debug, info, warn};
use rand::distributions::Standard;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::fmt;
use thiserror::Error;

const PROGRESS_INTERVAL: usize = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("The cohort contains no patients; there is nothing to resample.")]
    EmptyCohort,
    #[error("The number of bootstrap trials must be at least 1.")]
    NoTrials,
    #[error("The number of bootstrap partitions must be at least 1.")]
    NoPartitions,
}

/// How a statistic is rendered in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticKind {
    /// A probability shown as a percentage.
    Percentage,
    /// A BMI value in kg/m².
    Bmi,
    /// A proportion shown as-is.
    Proportion,
}

/// The 13 summary statistics, in export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Statistic {
    AverageRisk,
    Prevalence,
    PrevalenceUnder25,
    Prevalence25To54,
    Prevalence55Plus,
    CaseBmi,
    CaseBmiUnder25,
    CaseBmi25To54,
    CaseBmi55Plus,
    CaseObesity,
    CaseObesityUnder25,
    CaseObesity25To54,
    CaseObesity55Plus,
}

impl Statistic {
    pub const COUNT: usize = 13;

    pub const ALL: [Statistic; Statistic::COUNT] = [
        Statistic::AverageRisk,
        Statistic::Prevalence,
        Statistic::PrevalenceUnder25,
        Statistic::Prevalence25To54,
        Statistic::Prevalence55Plus,
        Statistic::CaseBmi,
        Statistic::CaseBmiUnder25,
        Statistic::CaseBmi25To54,
        Statistic::CaseBmi55Plus,
        Statistic::CaseObesity,
        Statistic::CaseObesityUnder25,
        Statistic::CaseObesity25To54,
        Statistic::CaseObesity55Plus,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn stratum_prevalence(stratum: AgeStratum) -> Self {
        match stratum {
            AgeStratum::Under25 => Self::PrevalenceUnder25,
            AgeStratum::From25To54 => Self::Prevalence25To54,
            AgeStratum::From55 => Self::Prevalence55Plus,
        }
    }

    pub fn stratum_case_bmi(stratum: AgeStratum) -> Self {
        match stratum {
            AgeStratum::Under25 => Self::CaseBmiUnder25,
            AgeStratum::From25To54 => Self::CaseBmi25To54,
            AgeStratum::From55 => Self::CaseBmi55Plus,
        }
    }

    pub fn stratum_case_obesity(stratum: AgeStratum) -> Self {
        match stratum {
            AgeStratum::Under25 => Self::CaseObesityUnder25,
            AgeStratum::From25To54 => Self::CaseObesity25To54,
            AgeStratum::From55 => Self::CaseObesity55Plus,
        }
    }

    pub fn kind(self) -> StatisticKind {
        match self {
            Self::AverageRisk
            | Self::Prevalence
            | Self::PrevalenceUnder25
            | Self::Prevalence25To54
            | Self::Prevalence55Plus => StatisticKind::Percentage,
            Self::CaseBmi | Self::CaseBmiUnder25 | Self::CaseBmi25To54 | Self::CaseBmi55Plus => {
                StatisticKind::Bmi
            }
            Self::CaseObesity
            | Self::CaseObesityUnder25
            | Self::CaseObesity25To54
            | Self::CaseObesity55Plus => StatisticKind::Proportion,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::AverageRisk => "Average Risk",
            Self::Prevalence => "Prevalence",
            Self::PrevalenceUnder25 => "Prevalence Age <25",
            Self::Prevalence25To54 => "Prevalence Age 25-54",
            Self::Prevalence55Plus => "Prevalence Age 55+",
            Self::CaseBmi => "Average BMI among cases",
            Self::CaseBmiUnder25 => "Average BMI among cases Age <25",
            Self::CaseBmi25To54 => "Average BMI among cases Age 25-54",
            Self::CaseBmi55Plus => "Average BMI among cases Age 55+",
            Self::CaseObesity => "Obesity Prevalence among cases",
            Self::CaseObesityUnder25 => "Obesity Prevalence among cases Age <25",
            Self::CaseObesity25To54 => "Obesity Prevalence among cases Age 25-54",
            Self::CaseObesity55Plus => "Obesity Prevalence among cases Age 55+",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Case counts and BMI accumulators for one bucket (overall or one stratum).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CaseBucket {
    cases: u64,
    bmi_sum: f64,
    obese: u64,
}

impl CaseBucket {
    fn add(&mut self, patient: &Patient) {
        self.cases += 1;
        self.bmi_sum += patient.bmi_raw;
        if patient.is_obese() {
            self.obese += 1;
        }
    }

    fn mean_bmi(&self) -> f64 {
        if self.cases > 0 {
            self.bmi_sum / self.cases as f64
        } else {
            0.0
        }
    }

    fn obesity_proportion(&self) -> f64 {
        if self.cases > 0 {
            self.obese as f64 / self.cases as f64
        } else {
            0.0
        }
    }
}

/// Single-pass accumulator over one resample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialTally {
    sampled: u64,
    risk_sum: f64,
    overall: CaseBucket,
    strata: [CaseBucket; 3],
    stratum_totals: [u64; 3],
}

impl TrialTally {
    pub fn observe(&mut self, patient: &Patient) {
        let stratum = patient.stratum().index();
        self.sampled += 1;
        self.risk_sum += patient.risk_assessment;
        if patient.has_condition {
            self.overall.add(patient);
            self.strata[stratum].add(patient);
        }
        self.stratum_totals[stratum] += 1;
    }

    /// Tallies an explicit resample, in the order given.
    pub fn from_resample<'a, I>(resample: I) -> Self
    where
        I: IntoIterator<Item = &'a Patient>,
    {
        let mut tally = Self::default();
        for patient in resample {
            tally.observe(patient);
        }
        tally
    }

    pub fn sampled(&self) -> u64 {
        self.sampled
    }

    pub fn stratum_total(&self, stratum: AgeStratum) -> u64 {
        self.stratum_totals[stratum.index()]
    }

    /// Derives the trial's 13 values. Case means fall back to 0.0 when a bucket
    /// has no cases. A stratum with no sampled patients has an undefined
    /// prevalence and yields NaN.
    pub fn statistics(&self) -> TrialStatistics {
        let mut values = [0.0; Statistic::COUNT];
        let n = self.sampled as f64;

        values[Statistic::AverageRisk.index()] = self.risk_sum / n;
        values[Statistic::Prevalence.index()] = self.overall.cases as f64 / n;
        values[Statistic::CaseBmi.index()] = self.overall.mean_bmi();
        values[Statistic::CaseObesity.index()] = self.overall.obesity_proportion();

        for stratum in AgeStratum::ALL {
            let bucket = &self.strata[stratum.index()];
            let total = self.stratum_totals[stratum.index()];
            values[Statistic::stratum_prevalence(stratum).index()] = if total > 0 {
                bucket.cases as f64 / total as f64
            } else {
                f64::NAN
            };
            values[Statistic::stratum_case_bmi(stratum).index()] = bucket.mean_bmi();
            values[Statistic::stratum_case_obesity(stratum).index()] = bucket.obesity_proportion();
        }

        TrialStatistics(values)
    }
}

/// The 13 values produced by one trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialStatistics([f64; Statistic::COUNT]);

impl TrialStatistics {
    pub fn get(&self, statistic: Statistic) -> f64 {
        self.0[statistic.index()]
    }
}

/// Per-statistic values across all trials, in trial order until sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticDistributions {
    values: [Vec<f64>; Statistic::COUNT],
}

impl StatisticDistributions {
    pub fn with_capacity(trials: usize) -> Self {
        Self {
            values: std::array::from_fn(|_| Vec::with_capacity(trials)),
        }
    }

    pub fn record(&mut self, trial: &TrialStatistics) {
        for statistic in Statistic::ALL {
            self.values[statistic.index()].push(trial.get(statistic));
        }
    }

    /// Appends another set of distributions after this one's trials.
    pub fn append(&mut self, other: StatisticDistributions) {
        for (mine, theirs) in self.values.iter_mut().zip(other.values) {
            mine.extend(theirs);
        }
    }

    pub fn trials(&self) -> usize {
        self.values[0].len()
    }

    pub fn get(&self, statistic: Statistic) -> &[f64] {
        &self.values[statistic.index()]
    }

    pub fn get_mut(&mut self, statistic: Statistic) -> &mut [f64] {
        &mut self.values[statistic.index()]
    }
}

/// Streams one resample: `N` uniform draws with replacement from `patients`.
pub fn resample<'a, R>(patients: &'a [Patient], rng: &'a mut R) -> impl Iterator<Item = &'a Patient>
where
    R: Rng + ?Sized,
{
    let n = patients.len();
    (0..n).map(move |_| &patients[rng.gen_range(0..n)])
}

/// Runs one trial against the given generator.
pub fn run_trial<R: Rng + ?Sized>(patients: &[Patient], rng: &mut R) -> TrialStatistics {
    TrialTally::from_resample(resample(patients, rng)).statistics()
}

fn check_inputs(cohort: &Cohort, trials: usize) -> Result<(), BootstrapError> {
    if cohort.is_empty() {
        return Err(BootstrapError::EmptyCohort);
    }
    if trials == 0 {
        return Err(BootstrapError::NoTrials);
    }
    for (stratum, count) in AgeStratum::ALL.iter().zip(cohort.stratum_counts()) {
        if count == 0 {
            warn!("Age stratum {stratum} has no patients; its prevalence will be reported as NaN.");
        }
    }
    Ok(())
}

/// Sequential bootstrap over a single generator stream.
pub fn run_bootstrap<R: Rng + ?Sized>(
    cohort: &Cohort,
    trials: usize,
    rng: &mut R,
    progress: &mut dyn ProgressObserver,
) -> Result<StatisticDistributions, BootstrapError> {
    check_inputs(cohort, trials)?;
    info!(
        "Running {trials} bootstrap trials over {} patients",
        cohort.len()
    );

    progress.on_stage_start(SimulationStage::Bootstrap, trials);
    let mut distributions = StatisticDistributions::with_capacity(trials);
    for trial in 0..trials {
        distributions.record(&run_trial(cohort.patients(), rng));
        if (trial + 1) % PROGRESS_INTERVAL == 0 {
            progress.on_stage_advance(SimulationStage::Bootstrap, trial + 1);
        }
    }
    progress.on_stage_finish(SimulationStage::Bootstrap);

    Ok(distributions)
}

/// Splits `trials` into `partitions` contiguous chunks whose sizes differ by at
/// most one; earlier partitions take the remainder.
pub fn partition_sizes(trials: usize, partitions: usize) -> Vec<usize> {
    let base = trials / partitions;
    let remainder = trials % partitions;
    (0..partitions)
        .map(|p| base + usize::from(p < remainder))
        .collect()
}

/// Partitioned bootstrap on the rayon pool. With one partition this still uses
/// a derived stream, so it does not reproduce [`run_bootstrap`].
pub fn run_partitioned_bootstrap<R: Rng + ?Sized>(
    cohort: &Cohort,
    trials: usize,
    partitions: usize,
    rng: &mut R,
    progress: &mut dyn ProgressObserver,
) -> Result<StatisticDistributions, BootstrapError> {
    check_inputs(cohort, trials)?;
    if partitions == 0 {
        return Err(BootstrapError::NoPartitions);
    }
    info!(
        "Running {trials} bootstrap trials over {} patients in {partitions} partitions",
        cohort.len()
    );

    let seeds: Vec<u64> = (0..partitions).map(|_| rng.sample(Standard)).collect();
    let sizes = partition_sizes(trials, partitions);
    debug!("Partition sizes: {sizes:?}");

    progress.on_stage_start(SimulationStage::Bootstrap, trials);
    let patients = cohort.patients();
    let parts: Vec<StatisticDistributions> = seeds
        .into_par_iter()
        .zip(sizes.into_par_iter())
        .map(|(seed, size)| {
            let mut stream = StdRng::seed_from_u64(seed);
            let mut part = StatisticDistributions::with_capacity(size);
            for _ in 0..size {
                part.record(&run_trial(patients, &mut stream));
            }
            part
        })
        .collect();

    let mut distributions = StatisticDistributions::with_capacity(trials);
    for part in parts {
        distributions.append(part);
    }
    progress.on_stage_advance(SimulationStage::Bootstrap, distributions.trials());
    progress.on_stage_finish(SimulationStage::Bootstrap);

    Ok(distributions)
}
