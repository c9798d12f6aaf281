//! Point estimates and 95% percentile intervals over bootstrap distributions.
//!
//! The estimation strategy is pluggable. [`OrderStatistic`] reproduces the
//! reference output exactly: a fixed-index "median" that averages the elements
//! at `t/2` and `t/2 + 1`, and bounds taken at `floor(0.025·t)` and
//! `floor(0.975·t)` with no interpolation. [`Interpolated`] is the textbook
//! linearly interpolated percentile.

use crate::bootstrap::{Statistic, StatisticDistributions};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LOWER_QUANTILE: f64 = 0.025;
pub const UPPER_QUANTILE: f64 = 0.975;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error(
        "The '{method}' interval method needs at least {required} bootstrap trials, but {found} were run."
    )]
    TooFewTrials {
        method: &'static str,
        required: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
}

pub trait IntervalEstimator: Sync {
    fn name(&self) -> &'static str;

    fn min_trials(&self) -> usize;

    /// Estimates from values already sorted ascending by [`sort_distribution`].
    fn estimate_sorted(&self, sorted: &[f64]) -> Interval;

    fn estimate(&self, values: &mut [f64]) -> Result<Interval, IntervalError> {
        if values.len() < self.min_trials() {
            return Err(IntervalError::TooFewTrials {
                method: self.name(),
                required: self.min_trials(),
                found: values.len(),
            });
        }
        sort_distribution(values);
        Ok(self.estimate_sorted(values))
    }
}

/// Sorts ascending under a total order; NaN values (undefined trials) sort last.
pub fn sort_distribution(values: &mut [f64]) {
    values.sort_by(f64::total_cmp);
}

/// Fixed-index order statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderStatistic;

impl IntervalEstimator for OrderStatistic {
    fn name(&self) -> &'static str {
        "order-statistic"
    }

    /// `t/2 + 1` must be a valid index.
    fn min_trials(&self) -> usize {
        3
    }

    fn estimate_sorted(&self, sorted: &[f64]) -> Interval {
        let t = sorted.len();
        let mid = t / 2;
        Interval {
            median: (sorted[mid] + sorted[mid + 1]) / 2.0,
            lower: sorted[(t as f64 * LOWER_QUANTILE) as usize],
            upper: sorted[(t as f64 * UPPER_QUANTILE) as usize],
        }
    }
}

/// Linearly interpolated percentiles (Hyndman & Fan type 7).
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpolated;

impl Interpolated {
    fn quantile(sorted: &[f64], p: f64) -> f64 {
        let h = (sorted.len() - 1) as f64 * p;
        let below = h.floor() as usize;
        let above = (below + 1).min(sorted.len() - 1);
        let frac = h - below as f64;
        sorted[below] + frac * (sorted[above] - sorted[below])
    }
}

impl IntervalEstimator for Interpolated {
    fn name(&self) -> &'static str {
        "interpolated"
    }

    fn min_trials(&self) -> usize {
        1
    }

    fn estimate_sorted(&self, sorted: &[f64]) -> Interval {
        Interval {
            median: Self::quantile(sorted, 0.5),
            lower: Self::quantile(sorted, LOWER_QUANTILE),
            upper: Self::quantile(sorted, UPPER_QUANTILE),
        }
    }
}

/// Configuration-level selector for the estimation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalMethod {
    #[default]
    OrderStatistic,
    Interpolated,
}

impl IntervalMethod {
    pub fn estimator(self) -> &'static dyn IntervalEstimator {
        match self {
            Self::OrderStatistic => &OrderStatistic,
            Self::Interpolated => &Interpolated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryRow {
    pub statistic: Statistic,
    pub interval: Interval,
}

/// One row per [`Statistic`], in [`Statistic::ALL`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn get(&self, statistic: Statistic) -> Interval {
        self.rows[statistic.index()].interval
    }
}

/// Sorts every distribution in place and estimates its interval.
pub fn summarize(
    distributions: &mut StatisticDistributions,
    estimator: &dyn IntervalEstimator,
) -> Result<SummaryTable, IntervalError> {
    let mut rows = Vec::with_capacity(Statistic::COUNT);
    for statistic in Statistic::ALL {
        let interval = estimator.estimate(distributions.get_mut(statistic))?;
        rows.push(SummaryRow {
            statistic,
            interval,
        });
    }
    Ok(SummaryTable { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{TrialTally, run_bootstrap};
    use crate::cohort::{Cohort, Patient};
    use crate::progress::NoopProgress;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn order_statistic_indices_match_reference_arithmetic() {
        let mut values: Vec<f64> = (0..2500).rev().map(|v| v as f64).collect();
        let interval = OrderStatistic.estimate(&mut values).unwrap();
        assert_eq!(interval.median, (1250.0 + 1251.0) / 2.0);
        assert_eq!(interval.lower, 62.0);
        assert_eq!(interval.upper, 2437.0);
    }

    #[test]
    fn order_statistic_for_odd_trial_counts() {
        let mut values: Vec<f64> = (0..41).map(|v| v as f64).collect();
        let interval = OrderStatistic.estimate(&mut values).unwrap();
        assert_eq!(interval.median, 20.5);
        assert_eq!(interval.lower, 1.0);
        assert_eq!(interval.upper, 39.0);
    }

    #[test]
    fn order_statistic_needs_three_trials() {
        let mut values = vec![1.0, 2.0];
        assert_eq!(
            OrderStatistic.estimate(&mut values),
            Err(IntervalError::TooFewTrials {
                method: "order-statistic",
                required: 3,
                found: 2,
            })
        );
        let mut values = vec![3.0, 1.0, 2.0];
        assert_eq!(OrderStatistic.estimate(&mut values).unwrap().median, 2.5);
    }

    #[test]
    fn interpolated_percentiles() {
        let mut values: Vec<f64> = (0..=100).map(|v| v as f64).collect();
        let interval = Interpolated.estimate(&mut values).unwrap();
        assert_relative_eq!(interval.median, 50.0);
        assert_relative_eq!(interval.lower, 2.5);
        assert_relative_eq!(interval.upper, 97.5);

        let mut single = vec![4.2];
        let interval = Interpolated.estimate(&mut single).unwrap();
        assert_eq!(
            (interval.lower, interval.median, interval.upper),
            (4.2, 4.2, 4.2)
        );
    }

    #[test]
    fn nan_sorts_last() {
        let mut values = vec![f64::NAN, 3.0, 1.0, 2.0];
        sort_distribution(&mut values);
        assert_eq!(&values[..3], &[1.0, 2.0, 3.0]);
        assert!(values[3].is_nan());
    }

    #[test]
    fn bounds_bracket_the_median_for_every_statistic() {
        let patients: Vec<Patient> = (0..400u32)
            .map(|i| {
                Patient::loaded(
                    format!("P{i}"),
                    i % 95,
                    16.0 + (i % 30) as f64,
                    (i % 13) as f64 / 100.0,
                    i % 9 == 0,
                )
            })
            .collect();
        let cohort = Cohort::new(patients);
        for trials in [40, 41, 100] {
            let mut distributions = run_bootstrap(
                &cohort,
                trials,
                &mut StdRng::seed_from_u64(67),
                &mut NoopProgress,
            )
            .unwrap();
            for method in [IntervalMethod::OrderStatistic, IntervalMethod::Interpolated] {
                let table = summarize(&mut distributions, method.estimator()).unwrap();
                assert_eq!(table.rows().len(), Statistic::COUNT);
                for row in table.rows() {
                    let i = row.interval;
                    assert!(i.lower <= i.median, "{}: {i:?}", row.statistic);
                    assert!(i.median <= i.upper, "{}: {i:?}", row.statistic);
                }
            }
        }
    }

    #[test]
    fn summary_rows_follow_statistic_order() {
        let patients = vec![Patient::loaded("P0".into(), 30, 27.0, 0.1, false)];
        let stats = TrialTally::from_resample(&patients).statistics();
        let mut distributions = StatisticDistributions::with_capacity(3);
        for _ in 0..3 {
            distributions.record(&stats);
        }
        let table = summarize(&mut distributions, &OrderStatistic).unwrap();
        let order: Vec<Statistic> = table.rows().iter().map(|r| r.statistic).collect();
        assert_eq!(order, Statistic::ALL.to_vec());
        assert_relative_eq!(table.get(Statistic::AverageRisk).median, 0.1);
    }
}
