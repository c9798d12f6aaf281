//! End-to-end orchestration: generate or load a cohort, bootstrap it, and
//! summarize the distributions.
//!
//! A [`Simulation`] owns the single seeded generator for a run. Generation and
//! the bootstrap draw from it in that order, so the same configuration always
//! produces the same cohort and the same summary table.

use crate::bootstrap::{BootstrapError, run_bootstrap, run_partitioned_bootstrap};
use crate::cohort::{Cohort, CohortGenerator};
use crate::config::{ConfigError, SimulationConfig};
use crate::interval::{IntervalError, SummaryTable, summarize};
use crate::io::{CohortIoError, export_cohort, export_summary, load_cohort};
use crate::progress::ProgressObserver;
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    CohortIo(#[from] CohortIoError),
    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("Interval estimation failed: {0}")]
    Interval(#[from] IntervalError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub cohort_size: usize,
    pub summary: SummaryTable,
}

pub struct Simulation {
    config: SimulationConfig,
    rng: StdRng,
}

impl Simulation {
    /// Validates the configuration and seeds the run's generator.
    pub fn new(config: SimulationConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, rng })
    }

    /// Validates only what cohort generation reads. Bootstrap settings are
    /// checked later, if [`Simulation::bootstrap`] is ever called.
    pub fn for_generation(config: SimulationConfig) -> Result<Self, PipelineError> {
        config.validate_model()?;
        config.validate_generation()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn generate_cohort(
        &mut self,
        progress: &mut dyn ProgressObserver,
    ) -> Result<Cohort, PipelineError> {
        self.config.validate_generation()?;
        let model = self.config.risk_model();
        let generator = CohortGenerator::new(
            self.config.patients,
            self.config.mean_bmi,
            &self.config.calibration,
            &model,
        );
        Ok(generator.generate(&mut self.rng, progress))
    }

    pub fn bootstrap(
        &mut self,
        cohort: &Cohort,
        progress: &mut dyn ProgressObserver,
    ) -> Result<SimulationOutcome, PipelineError> {
        self.config.validate_bootstrap()?;
        let trials = self.config.trials;
        let mut distributions = if self.config.partitions == 1 {
            run_bootstrap(cohort, trials, &mut self.rng, progress)?
        } else {
            run_partitioned_bootstrap(
                cohort,
                trials,
                self.config.partitions,
                &mut self.rng,
                progress,
            )?
        };

        let estimator = self.config.interval.estimator();
        info!("Estimating {} intervals", estimator.name());
        let summary = summarize(&mut distributions, estimator)?;
        Ok(SimulationOutcome {
            cohort_size: cohort.len(),
            summary,
        })
    }
}

/// Generates a cohort, optionally exports it, then bootstraps it.
pub fn run_synthetic(
    config: SimulationConfig,
    cohort_output: Option<&Path>,
    progress: &mut dyn ProgressObserver,
) -> Result<SimulationOutcome, PipelineError> {
    let mut simulation = Simulation::new(config)?;
    let cohort = simulation.generate_cohort(progress)?;
    if let Some(path) = cohort_output {
        export_cohort(&cohort, path)?;
    }
    simulation.bootstrap(&cohort, progress)
}

/// Bootstraps a previously exported cohort. Generation settings are ignored.
pub fn run_loaded(
    config: SimulationConfig,
    cohort_path: &Path,
    progress: &mut dyn ProgressObserver,
) -> Result<SimulationOutcome, PipelineError> {
    let mut simulation = Simulation::new(config)?;
    let cohort = load_cohort(cohort_path)?;
    simulation.bootstrap(&cohort, progress)
}

/// Writes the summary table of a finished run.
pub fn write_summary(outcome: &SimulationOutcome, path: &Path) -> Result<(), PipelineError> {
    export_summary(&outcome.summary, path)?;
    Ok(())
}
