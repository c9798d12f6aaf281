//! # Risk Model
//!
//! A patient's latent disease probability is the sigmoid of a linear predictor
//! built from five log-odds contributions, evaluated in a fixed order:
//!
//! 1. baseline (logit of the sampled baseline prevalence)
//! 2. genetics (log genetic odds ratio for the allele dosage)
//! 3. smoking × genetics interaction (see [`interaction_term`])
//! 4. age (logistic curve rescaled into a log-odds band)
//! 5. BMI (z-scored BMI times an age-attenuated log odds ratio)
//!
//! The smoking status behind term 3 is drawn from the shared generator while the
//! terms are evaluated, so evaluation order is part of the reproducibility
//! contract.

use crate::calibration::{AlleleCount, RiskOdds};
use rand::Rng;
use rand::distributions::Standard;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Default decay rate of the BMI odds ratio per year of age past 15.
pub const DEFAULT_BMI_DECAY_RATE: f64 = -0.065;

/// Mean and standard deviation used to z-score BMI.
pub const BMI_REFERENCE_MEAN: f64 = 27.0;
pub const BMI_REFERENCE_SD: f64 = 5.0;

const BMI_PEAK_ODDS_RATIO: f64 = 1.26;
const BMI_FLOOR_ODDS_RATIO: f64 = 1.01;

const AGE_CURVE_START: f64 = 15.0;
const AGE_CURVE_END: f64 = 80.0;
const AGE_CURVE_MIDPOINT: f64 = 0.5;
const AGE_CURVE_STEEPNESS: f64 = 6.0;
const AGE_MIN_LOG_ODDS: f64 = -3.0;
const AGE_MAX_LOG_ODDS: f64 = 0.1;

/// One term of the linear predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTerm {
    Baseline,
    Genetics,
    SmokingInteraction,
    Age,
    Bmi,
}

impl RiskTerm {
    /// Every term, in evaluation order.
    pub const ALL: [RiskTerm; 5] = [
        RiskTerm::Baseline,
        RiskTerm::Genetics,
        RiskTerm::SmokingInteraction,
        RiskTerm::Age,
        RiskTerm::Bmi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Genetics => "genetics",
            Self::SmokingInteraction => "smoking_interaction",
            Self::Age => "age",
            Self::Bmi => "bmi",
        }
    }
}

impl fmt::Display for RiskTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named log-odds contribution to a patient's linear predictor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub term: RiskTerm,
    pub log_odds: f64,
}

/// The set of terms that enter the linear predictor. Terms outside the set are
/// still evaluated and recorded, they are only left out of the sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnabledTerms(BTreeSet<RiskTerm>);

impl Default for EnabledTerms {
    fn default() -> Self {
        Self::all()
    }
}

impl EnabledTerms {
    pub fn all() -> Self {
        Self(RiskTerm::ALL.into_iter().collect())
    }

    pub fn only<I: IntoIterator<Item = RiskTerm>>(terms: I) -> Self {
        Self(terms.into_iter().collect())
    }

    pub fn contains(&self, term: RiskTerm) -> bool {
        self.0.contains(&term)
    }

    pub fn is_complete(&self) -> bool {
        self.0.len() == RiskTerm::ALL.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = RiskTerm> + '_ {
        self.0.iter().copied()
    }
}

/// The covariates the model reads for one patient.
#[derive(Debug, Clone, Copy)]
pub struct RiskInputs<'a> {
    pub age: u32,
    pub bmi_raw: f64,
    pub alleles: AlleleCount,
    pub odds: &'a RiskOdds,
}

/// The evaluated linear predictor for one patient.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    /// Exactly five contributions, in [`RiskTerm::ALL`] order.
    pub features: Vec<Contribution>,
    pub linear_predictor: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskModel {
    bmi_decay_rate: f64,
    enabled: EnabledTerms,
}

impl Default for RiskModel {
    fn default() -> Self {
        Self::new(DEFAULT_BMI_DECAY_RATE, EnabledTerms::all())
    }
}

impl RiskModel {
    pub fn new(bmi_decay_rate: f64, enabled: EnabledTerms) -> Self {
        Self {
            bmi_decay_rate,
            enabled,
        }
    }

    pub fn bmi_decay_rate(&self) -> f64 {
        self.bmi_decay_rate
    }

    pub fn enabled_terms(&self) -> &EnabledTerms {
        &self.enabled
    }

    /// Evaluates all five terms and maps their enabled sum through the sigmoid.
    /// Consumes exactly one uniform draw (smoking status).
    pub fn assess<R: Rng + ?Sized>(&self, inputs: RiskInputs<'_>, rng: &mut R) -> RiskAssessment {
        let baseline = baseline_term(inputs.odds);
        let genetics = genetics_term(inputs.alleles, inputs.odds);
        let smoking = smoking_term(inputs.age, inputs.odds, rng);
        let interaction = interaction_term(inputs.alleles, inputs.odds, smoking, genetics);
        let age = age_term(inputs.age);
        let bmi = bmi_term(inputs.age, inputs.bmi_raw, self.bmi_decay_rate);

        let features = vec![
            Contribution {
                term: RiskTerm::Baseline,
                log_odds: baseline,
            },
            Contribution {
                term: RiskTerm::Genetics,
                log_odds: genetics,
            },
            Contribution {
                term: RiskTerm::SmokingInteraction,
                log_odds: interaction,
            },
            Contribution {
                term: RiskTerm::Age,
                log_odds: age,
            },
            Contribution {
                term: RiskTerm::Bmi,
                log_odds: bmi,
            },
        ];

        let linear_predictor = self.linear_predictor(&features);
        RiskAssessment {
            features,
            linear_predictor,
            probability: sigmoid(linear_predictor),
        }
    }

    /// Sums the enabled contributions in their stored order.
    pub fn linear_predictor(&self, features: &[Contribution]) -> f64 {
        let mut z = 0.0;
        for feature in features {
            if self.enabled.contains(feature.term) {
                z += feature.log_odds;
            }
        }
        z
    }
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

pub fn baseline_term(odds: &RiskOdds) -> f64 {
    logit(odds.baseline)
}

pub fn genetics_term(alleles: AlleleCount, odds: &RiskOdds) -> f64 {
    odds.genetic(alleles).ln()
}

/// Smoking prevalence by age band.
pub fn smoking_prevalence(age: u32) -> f64 {
    if age < 25 {
        0.05
    } else if age < 55 {
        0.13
    } else {
        0.10
    }
}

/// Draws smoking status and returns its log-odds contribution (0 for non-smokers).
pub fn smoking_term<R: Rng + ?Sized>(age: u32, odds: &RiskOdds, rng: &mut R) -> f64 {
    let chance: f64 = rng.sample(Standard);
    if chance < smoking_prevalence(age) {
        odds.smoking.ln()
    } else {
        0.0
    }
}

/// Substitutive interaction: when both the smoking and genetics contributions
/// are positive the interaction odds ratio replaces the smoking term, otherwise
/// the smoking term passes through unchanged. The two are never added.
pub fn interaction_term(alleles: AlleleCount, odds: &RiskOdds, smoking: f64, genetics: f64) -> f64 {
    if smoking > 0.0 && genetics > 0.0 {
        odds.interaction(alleles).ln()
    } else {
        smoking
    }
}

/// Strong protection at young ages, mild elevation in old age.
pub fn age_term(age: u32) -> f64 {
    let fraction =
        ((age as f64 - AGE_CURVE_START) / (AGE_CURVE_END - AGE_CURVE_START)).clamp(0.0, 1.0);
    let logistic = sigmoid(AGE_CURVE_STEEPNESS * (fraction - AGE_CURVE_MIDPOINT));
    AGE_MIN_LOG_ODDS + logistic * (AGE_MAX_LOG_ODDS - AGE_MIN_LOG_ODDS)
}

/// Per-SD BMI odds ratio at the given age. Peaks at 1.26 by age 15 and decays
/// towards 1.01 at rate `decay_rate` (which should be non-positive).
pub fn effective_bmi_odds_ratio(age: u32, decay_rate: f64) -> f64 {
    let years_past_peak = (age as f64 - AGE_CURVE_START).max(0.0);
    let decay = (decay_rate * years_past_peak).exp();
    (1.0 + (BMI_PEAK_ODDS_RATIO - 1.0) * decay).max(BMI_FLOOR_ODDS_RATIO)
}

pub fn bmi_z_score(bmi_raw: f64) -> f64 {
    (bmi_raw - BMI_REFERENCE_MEAN) / BMI_REFERENCE_SD
}

pub fn bmi_term(age: u32, bmi_raw: f64, decay_rate: f64) -> f64 {
    effective_bmi_odds_ratio(age, decay_rate).ln() * bmi_z_score(bmi_raw)
}
