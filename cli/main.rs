#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;

use prevalon::config::SimulationConfig;
use prevalon::interval::IntervalMethod;
use prevalon::io::export_cohort;
use prevalon::pipeline::{
    PipelineError, Simulation, SimulationOutcome, run_loaded, run_synthetic, write_summary,
};
use prevalon::progress::{NoopProgress, ProgressObserver, SimulationStage};
use prevalon::report::SimulationReport;

#[derive(Clone, Copy, ValueEnum)]
pub enum IntervalMethodCli {
    OrderStatistic,
    Interpolated,
}

impl From<IntervalMethodCli> for IntervalMethod {
    fn from(method: IntervalMethodCli) -> Self {
        match method {
            IntervalMethodCli::OrderStatistic => IntervalMethod::OrderStatistic,
            IntervalMethodCli::Interpolated => IntervalMethod::Interpolated,
        }
    }
}

/// Settings shared by every subcommand. Flags override the configuration file.
#[derive(Args)]
pub struct SimulationArgs {
    /// TOML configuration file; unspecified keys take their defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of synthetic patients to generate
    #[arg(long, value_name = "N")]
    pub patients: Option<usize>,

    /// Mean BMI for patients under 25
    #[arg(long)]
    pub mean_bmi: Option<f64>,

    /// Per-year decay of the BMI odds ratio past age 15
    #[arg(long, allow_hyphen_values = true)]
    pub decay_rate: Option<f64>,

    /// Number of bootstrap trials
    #[arg(long)]
    pub trials: Option<usize>,

    /// Seed for the run's random number generator
    #[arg(long)]
    pub seed: Option<u64>,

    /// Percentile interval method
    #[arg(long, value_enum)]
    pub interval: Option<IntervalMethodCli>,

    /// Split bootstrap trials across this many parallel streams
    #[arg(long)]
    pub partitions: Option<usize>,

    /// Suppress progress bars
    #[arg(long)]
    pub quiet: bool,
}

impl SimulationArgs {
    fn resolve(&self) -> Result<SimulationConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::load(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(patients) = self.patients {
            config.patients = patients;
        }
        if let Some(mean_bmi) = self.mean_bmi {
            config.mean_bmi = mean_bmi;
        }
        if let Some(decay_rate) = self.decay_rate {
            config.bmi_decay_rate = decay_rate;
        }
        if let Some(trials) = self.trials {
            config.trials = trials;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(interval) = self.interval {
            config.interval = interval.into();
        }
        if let Some(partitions) = self.partitions {
            config.partitions = partitions;
        }
        Ok(config)
    }

    fn progress(&self) -> Box<dyn ProgressObserver> {
        if self.quiet {
            Box::new(NoopProgress)
        } else {
            Box::new(BarProgress::default())
        }
    }
}

#[derive(Parser)]
#[command(
    name = "prevalon",
    about = "Synthetic cohort simulation and bootstrap prevalence estimation",
    long_about = "Generates a synthetic patient cohort from literature-calibrated risk factors, \
                 assigns case status from each patient's modeled risk, and estimates prevalence \
                 and case characteristics with bootstrap percentile intervals."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic cohort and export it
    Generate {
        /// Destination for the cohort file
        #[arg(long, value_name = "COHORT_CSV")]
        output: PathBuf,

        #[command(flatten)]
        args: SimulationArgs,
    },
    /// Bootstrap a previously exported cohort
    Simulate {
        /// Cohort file to load
        #[arg(long, value_name = "COHORT_CSV")]
        cohort: PathBuf,

        /// Destination for the summary table
        #[arg(long, value_name = "SUMMARY_CSV")]
        output: PathBuf,

        #[command(flatten)]
        args: SimulationArgs,
    },
    /// Generate, export, and bootstrap a synthetic cohort
    Run {
        /// Destination for the generated cohort file
        #[arg(long, value_name = "COHORT_CSV")]
        cohort_output: PathBuf,

        /// Destination for the summary table
        #[arg(long, value_name = "SUMMARY_CSV")]
        output: PathBuf,

        #[command(flatten)]
        args: SimulationArgs,
    },
}

/// Renders progress stages as terminal progress bars.
#[derive(Default)]
struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };

        let pb = ProgressBar::with_draw_target(Some(len), draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        pb.set_message(message.to_string());
        pb
    }
}

impl ProgressObserver for BarProgress {
    fn on_stage_start(&mut self, stage: SimulationStage, total: usize) {
        let message = format!("{stage} ({})", stage.unit());
        self.bar = Some(Self::create_progress_bar(total as u64, &message));
    }

    fn on_stage_advance(&mut self, _stage: SimulationStage, processed: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(processed as u64);
        }
    }

    fn on_stage_finish(&mut self, stage: SimulationStage) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message(format!("{stage} complete"));
        }
    }
}

fn print_report(outcome: &SimulationOutcome, config: &SimulationConfig) {
    let report = SimulationReport {
        cohort_size: outcome.cohort_size,
        trials: config.trials,
        method: config.interval.estimator().name(),
        summary: &outcome.summary,
    };
    println!("\n{report}");
}

fn run_generate(output: &Path, args: &SimulationArgs) -> Result<(), PipelineError> {
    let config = args.resolve()?;
    let mut progress = args.progress();
    let mut simulation = Simulation::for_generation(config)?;
    let cohort = simulation.generate_cohort(progress.as_mut())?;
    export_cohort(&cohort, output)?;
    println!(
        "Wrote {} patients ({} cases) to {}",
        cohort.len(),
        cohort.case_count(),
        output.display()
    );
    Ok(())
}

fn run_simulate(cohort: &Path, output: &Path, args: &SimulationArgs) -> Result<(), PipelineError> {
    let config = args.resolve()?;
    let mut progress = args.progress();
    let outcome = run_loaded(config.clone(), cohort, progress.as_mut())?;
    write_summary(&outcome, output)?;
    print_report(&outcome, &config);
    Ok(())
}

fn run_full(
    cohort_output: &Path,
    output: &Path,
    args: &SimulationArgs,
) -> Result<(), PipelineError> {
    let config = args.resolve()?;
    let mut progress = args.progress();
    let outcome = run_synthetic(config.clone(), Some(cohort_output), progress.as_mut())?;
    write_summary(&outcome, output)?;
    print_report(&outcome, &config);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Generate { output, args }) => run_generate(&output, &args),
        Some(Commands::Simulate {
            cohort,
            output,
            args,
        }) => run_simulate(&cohort, &output, &args),
        Some(Commands::Run {
            cohort_output,
            output,
            args,
        }) => run_full(&cohort_output, &output, &args),
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
