use crate::bootstrap::{Statistic, StatisticKind};
use crate::cohort::AgeStratum;
use crate::interval::{Interval, SummaryTable};
use std::fmt;

/// Published U.S. prevalence (percent, with 95% interval) from the Global
/// Burden of Disease study, printed next to the simulated figures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceFigure {
    pub label: &'static str,
    pub percent: f64,
    pub lower: f64,
    pub upper: f64,
}

pub const GBD_REFERENCE: [ReferenceFigure; 4] = [
    ReferenceFigure {
        label: "Overall",
        percent: 0.46,
        lower: 0.43,
        upper: 0.50,
    },
    ReferenceFigure {
        label: "Age <25",
        percent: 0.07,
        lower: 0.06,
        upper: 0.08,
    },
    ReferenceFigure {
        label: "Age 25-54",
        percent: 0.28,
        lower: 0.24,
        upper: 0.32,
    },
    ReferenceFigure {
        label: "Age 55+",
        percent: 1.02,
        lower: 0.92,
        upper: 1.12,
    },
];

/// Human-readable rendering of a finished simulation.
pub struct SimulationReport<'a> {
    pub cohort_size: usize,
    pub trials: usize,
    pub method: &'static str,
    pub summary: &'a SummaryTable,
}

fn write_interval(
    f: &mut fmt::Formatter<'_>,
    statistic: Statistic,
    interval: Interval,
) -> fmt::Result {
    match statistic.kind() {
        StatisticKind::Percentage => writeln!(
            f,
            "{:<42} {:.4}% (95% CI: {:.4}% - {:.4}%)",
            statistic.label(),
            interval.median * 100.0,
            interval.lower * 100.0,
            interval.upper * 100.0
        ),
        StatisticKind::Bmi => writeln!(
            f,
            "{:<42} {:.2} (95% CI: {:.2} - {:.2})",
            statistic.label(),
            interval.median,
            interval.lower,
            interval.upper
        ),
        StatisticKind::Proportion => writeln!(
            f,
            "{:<42} {:.4} (95% CI: {:.4} - {:.4})",
            statistic.label(),
            interval.median,
            interval.lower,
            interval.upper
        ),
    }
}

impl fmt::Display for SimulationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cohort size: {}", self.cohort_size)?;
        writeln!(
            f,
            "Bootstrap trials: {} ({} intervals)",
            self.trials, self.method
        )?;
        writeln!(f)?;
        for row in self.summary.rows() {
            write_interval(f, row.statistic, row.interval)?;
        }

        writeln!(f)?;
        writeln!(f, "GBD U.S. reference prevalence:")?;
        for (i, reference) in GBD_REFERENCE.iter().enumerate() {
            let simulated = if i == 0 {
                self.summary.get(Statistic::Prevalence)
            } else {
                self.summary
                    .get(Statistic::stratum_prevalence(AgeStratum::ALL[i - 1]))
            };
            writeln!(
                f,
                "  {:<10} {:.2}% (95% CI: {:.2}% - {:.2}%)   simulated {:.4}%",
                reference.label,
                reference.percent,
                reference.lower,
                reference.upper,
                simulated.median * 100.0
            )?;
        }
        Ok(())
    }
}
