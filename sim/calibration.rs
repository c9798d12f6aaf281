//! # Calibrated Parameter Sampling
//!
//! Per-patient odds ratios are not fixed constants. Each one is drawn once per
//! patient from a log-normal distribution whose parameters are recovered from a
//! published 95% confidence interval: the interval is read as spanning ±1.96
//! standard deviations on the log scale, centered on the log-scale midpoint.
//!
//! Odds ratios are floored at 1.0 (no factor is protective in this model). The
//! baseline prevalence is a probability-scale value and is never floored.

use rand::Rng;
use rand::distributions::Standard;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two-sided 95% normal quantile.
const Z_95: f64 = 1.96;

/// Cumulative thresholds on a single uniform draw for the allele dosage.
const HOMOZYGOUS_THRESHOLD: f64 = 0.08;
const HETEROZYGOUS_THRESHOLD: f64 = 0.45;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error(
        "Confidence bounds for '{name}' must be finite and strictly positive, found [{lower}, {upper}]."
    )]
    NonPositiveBound {
        name: &'static str,
        lower: f64,
        upper: f64,
    },
    #[error("Lower confidence bound {lower} for '{name}' exceeds the upper bound {upper}.")]
    InvertedBounds {
        name: &'static str,
        lower: f64,
        upper: f64,
    },
}

/// A published 95% confidence interval on the natural scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBounds {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceBounds {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Mean of the underlying normal distribution on the log scale.
    pub fn log_center(&self) -> f64 {
        (self.upper.ln() + self.lower.ln()) / 2.0
    }

    /// Standard deviation of the underlying normal distribution on the log scale.
    pub fn log_sd(&self) -> f64 {
        ((self.upper.ln() - self.lower.ln()) / 2.0) / Z_95
    }

    /// Maps a standard-normal draw `z` onto the natural scale.
    pub fn transform(&self, z: f64) -> f64 {
        (z * self.log_sd() + self.log_center()).exp()
    }

    /// Draws one value from the log-normal distribution implied by the bounds.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let z: f64 = rng.sample(StandardNormal);
        self.transform(z)
    }

    /// Draws one odds ratio, floored at 1.0.
    pub fn sample_odds_ratio<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.sample(rng).max(1.0)
    }

    fn validate(&self, name: &'static str) -> Result<(), CalibrationError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.lower) || !positive(self.upper) {
            return Err(CalibrationError::NonPositiveBound {
                name,
                lower: self.lower,
                upper: self.upper,
            });
        }
        if self.lower > self.upper {
            return Err(CalibrationError::InvertedBounds {
                name,
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }
}

/// The literature-derived intervals every patient's risk parameters are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationTable {
    /// Population baseline prevalence (GBD U.S. estimate).
    pub baseline_prevalence: ConfidenceBounds,
    pub smoking_odds_ratio: ConfidenceBounds,
    pub heterozygous_odds_ratio: ConfidenceBounds,
    pub homozygous_odds_ratio: ConfidenceBounds,
    /// Smoking × genetics interaction, one risk allele.
    pub heterozygous_interaction_odds_ratio: ConfidenceBounds,
    /// Smoking × genetics interaction, two risk alleles.
    pub homozygous_interaction_odds_ratio: ConfidenceBounds,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self {
            baseline_prevalence: ConfidenceBounds::new(0.0043, 0.0050),
            smoking_odds_ratio: ConfidenceBounds::new(1.32, 1.55),
            heterozygous_odds_ratio: ConfidenceBounds::new(1.5, 2.5),
            homozygous_odds_ratio: ConfidenceBounds::new(5.0, 6.0),
            heterozygous_interaction_odds_ratio: ConfidenceBounds::new(4.2, 13.1),
            homozygous_interaction_odds_ratio: ConfidenceBounds::new(7.2, 34.2),
        }
    }
}

impl CalibrationTable {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.baseline_prevalence.validate("baseline_prevalence")?;
        self.smoking_odds_ratio.validate("smoking_odds_ratio")?;
        self.heterozygous_odds_ratio.validate("heterozygous_odds_ratio")?;
        self.homozygous_odds_ratio.validate("homozygous_odds_ratio")?;
        self.heterozygous_interaction_odds_ratio.validate("heterozygous_interaction_odds_ratio")?;
        self.homozygous_interaction_odds_ratio.validate("homozygous_interaction_odds_ratio")?;
        Ok(())
    }

    /// Draws one patient's parameter bundle. The draw order is fixed; changing it
    /// changes every cohort generated from a given seed.
    pub fn sample_odds<R: Rng + ?Sized>(&self, rng: &mut R) -> RiskOdds {
        let baseline = self.baseline_prevalence.sample(rng);
        let smoking = self.smoking_odds_ratio.sample_odds_ratio(rng);
        let heterozygous = self.heterozygous_odds_ratio.sample_odds_ratio(rng);
        let homozygous = self.homozygous_odds_ratio.sample_odds_ratio(rng);
        let heterozygous_interaction = self
            .heterozygous_interaction_odds_ratio
            .sample_odds_ratio(rng);
        let homozygous_interaction = self
            .homozygous_interaction_odds_ratio
            .sample_odds_ratio(rng);
        RiskOdds {
            baseline,
            smoking,
            heterozygous,
            homozygous,
            heterozygous_interaction,
            homozygous_interaction,
        }
    }
}

/// One patient's sampled baseline prevalence and odds ratios.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskOdds {
    pub baseline: f64,
    pub smoking: f64,
    pub heterozygous: f64,
    pub homozygous: f64,
    pub heterozygous_interaction: f64,
    pub homozygous_interaction: f64,
}

impl RiskOdds {
    /// Genetic odds ratio for the given dosage (1.0 without risk alleles).
    pub fn genetic(&self, alleles: AlleleCount) -> f64 {
        match alleles {
            AlleleCount::Two => self.homozygous,
            AlleleCount::One => self.heterozygous,
            AlleleCount::Zero => 1.0,
        }
    }

    /// Smoking × genetics interaction odds ratio for the given dosage.
    pub fn interaction(&self, alleles: AlleleCount) -> f64 {
        match alleles {
            AlleleCount::Two => self.homozygous_interaction,
            AlleleCount::One => self.heterozygous_interaction,
            AlleleCount::Zero => 1.0,
        }
    }
}

/// Genetic risk allele dosage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlleleCount {
    Zero,
    One,
    Two,
}

impl AlleleCount {
    /// Maps a uniform draw on [0, 1) onto the fixed categorical distribution
    /// P(2) = 0.08, P(1) = 0.37, P(0) = 0.55.
    pub fn from_uniform(u: f64) -> Self {
        if u < HOMOZYGOUS_THRESHOLD {
            Self::Two
        } else if u < HETEROZYGOUS_THRESHOLD {
            Self::One
        } else {
            Self::Zero
        }
    }

    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_uniform(rng.sample(Standard))
    }

    pub fn dosage(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn transform_is_monotonic_in_the_normal_draw() {
        let table = CalibrationTable::default();
        let all = [
            table.baseline_prevalence,
            table.smoking_odds_ratio,
            table.heterozygous_odds_ratio,
            table.homozygous_odds_ratio,
            table.heterozygous_interaction_odds_ratio,
            table.homozygous_interaction_odds_ratio,
        ];
        for bounds in all {
            let mut previous = f64::NEG_INFINITY;
            for step in -40..=40 {
                let z = step as f64 / 10.0;
                let value = bounds.transform(z);
                assert!(value > previous, "not increasing at z={z} for {bounds:?}");
                previous = value;
            }
        }
    }

    #[test]
    fn bounds_map_to_plus_minus_1_96_sigma() {
        let bounds = ConfidenceBounds::new(1.32, 1.55);
        assert_relative_eq!(bounds.transform(-1.96), 1.32, max_relative = 1e-12);
        assert_relative_eq!(bounds.transform(1.96), 1.55, max_relative = 1e-12);
        assert_relative_eq!(
            bounds.transform(0.0),
            (1.32_f64 * 1.55).sqrt(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn odds_ratios_are_floored_but_baseline_is_not() {
        let table = CalibrationTable {
            baseline_prevalence: ConfidenceBounds::new(0.0043, 0.0050),
            smoking_odds_ratio: ConfidenceBounds::new(0.2, 0.5),
            heterozygous_odds_ratio: ConfidenceBounds::new(0.2, 0.5),
            homozygous_odds_ratio: ConfidenceBounds::new(0.2, 0.5),
            heterozygous_interaction_odds_ratio: ConfidenceBounds::new(0.2, 0.5),
            homozygous_interaction_odds_ratio: ConfidenceBounds::new(0.2, 0.5),
        };
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let odds = table.sample_odds(&mut rng);
            assert!(odds.baseline < 1.0);
            assert!(odds.smoking >= 1.0);
            assert!(odds.heterozygous >= 1.0);
            assert!(odds.homozygous >= 1.0);
            assert!(odds.heterozygous_interaction >= 1.0);
            assert!(odds.homozygous_interaction >= 1.0);
        }
    }

    #[test]
    fn allele_thresholds() {
        assert_eq!(AlleleCount::from_uniform(0.0), AlleleCount::Two);
        assert_eq!(AlleleCount::from_uniform(0.0799), AlleleCount::Two);
        assert_eq!(AlleleCount::from_uniform(0.08), AlleleCount::One);
        assert_eq!(AlleleCount::from_uniform(0.4499), AlleleCount::One);
        assert_eq!(AlleleCount::from_uniform(0.45), AlleleCount::Zero);
        assert_eq!(AlleleCount::from_uniform(0.999), AlleleCount::Zero);
    }

    #[test]
    fn allele_frequencies_follow_the_categorical_distribution() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut counts = [0usize; 3];
        let draws = 200_000;
        for _ in 0..draws {
            counts[AlleleCount::sample(&mut rng).dosage() as usize] += 1;
        }
        let freq = |i: usize| counts[i] as f64 / draws as f64;
        assert!((freq(2) - 0.08).abs() < 0.005);
        assert!((freq(1) - 0.37).abs() < 0.005);
        assert!((freq(0) - 0.55).abs() < 0.005);
    }

    #[test]
    fn genetic_and_interaction_lookups_follow_dosage() {
        let odds = RiskOdds {
            baseline: 0.0046,
            smoking: 1.4,
            heterozygous: 2.0,
            homozygous: 5.5,
            heterozygous_interaction: 7.0,
            homozygous_interaction: 15.0,
        };
        assert_eq!(odds.genetic(AlleleCount::Zero), 1.0);
        assert_eq!(odds.genetic(AlleleCount::One), 2.0);
        assert_eq!(odds.genetic(AlleleCount::Two), 5.5);
        assert_eq!(odds.interaction(AlleleCount::Zero), 1.0);
        assert_eq!(odds.interaction(AlleleCount::One), 7.0);
        assert_eq!(odds.interaction(AlleleCount::Two), 15.0);
    }

    #[test]
    fn validation_rejects_bad_bounds() {
        let mut table = CalibrationTable::default();
        assert!(table.validate().is_ok());

        table.smoking_odds_ratio = ConfidenceBounds::new(1.55, 1.32);
        assert!(matches!(
            table.validate(),
            Err(CalibrationError::InvertedBounds {
                name: "smoking_odds_ratio",
                ..
            })
        ));

        table.smoking_odds_ratio = ConfidenceBounds::new(0.0, 1.32);
        assert!(matches!(
            table.validate(),
            Err(CalibrationError::NonPositiveBound { .. })
        ));
    }
}
