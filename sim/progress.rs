//! Progress callbacks for long-running simulation stages.
//!
//! Library code reports through [`ProgressObserver`] and never draws anything
//! itself; the binary decides how (or whether) to render it. Counts are
//! patients for the two generation stages and trials for the bootstrap, see
//! [`SimulationStage::unit`].

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimulationStage {
    Generation,
    CaseAssignment,
    Bootstrap,
}

impl SimulationStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Generation => "cohort generation",
            Self::CaseAssignment => "case assignment",
            Self::Bootstrap => "bootstrap resampling",
        }
    }

    /// What the stage's `total` and `processed` counts are counting.
    pub fn unit(self) -> &'static str {
        match self {
            Self::Generation | Self::CaseAssignment => "patients",
            Self::Bootstrap => "trials",
        }
    }
}

impl fmt::Display for SimulationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Every method defaults to doing nothing, so observers implement only the
/// events they care about. Stages never overlap: each `on_stage_start` is
/// matched by one `on_stage_finish` before the next stage starts.
pub trait ProgressObserver {
    fn on_stage_start(&mut self, _stage: SimulationStage, _total: usize) {}

    /// `processed` is cumulative and only grows within a stage.
    fn on_stage_advance(&mut self, _stage: SimulationStage, _processed: usize) {}

    fn on_stage_finish(&mut self, _stage: SimulationStage) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {}
