//! # Patients, Cohorts and Synthetic Generation
//!
//! A [`Cohort`] is an ordered, immutable-after-construction collection of
//! patients. Generated patients carry their full [`RiskProfile`]; patients
//! loaded from an export only carry the columns that were persisted.

use crate::calibration::{AlleleCount, CalibrationTable, RiskOdds};
use crate::progress::{ProgressObserver, SimulationStage};
use crate::risk::{Contribution, RiskInputs, RiskModel};
use log::{debug, info};
use rand::Rng;
use rand::distributions::Standard;
use rand_distr::StandardNormal;
use std::fmt;

/// BMI at or above this value counts as obese.
pub const OBESITY_THRESHOLD: f64 = 30.0;

pub const BMI_MIN: f64 = 15.0;
pub const BMI_MAX: f64 = 50.0;
pub const BMI_SD: f64 = 5.0;

/// Mean BMI for patients aged 25 and over, regardless of configuration.
const ADULT_BMI_MEAN: f64 = 27.0;

/// Age mixture: children, adults, elderly.
const CHILD_SHARE: f64 = 0.18;
const ADULT_CUMULATIVE_SHARE: f64 = 0.94;

const PROGRESS_INTERVAL: usize = 10_000;

/// Disjoint age bands. Every age belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgeStratum {
    Under25,
    From25To54,
    From55,
}

impl AgeStratum {
    pub const ALL: [AgeStratum; 3] = [
        AgeStratum::Under25,
        AgeStratum::From25To54,
        AgeStratum::From55,
    ];

    pub fn of(age: u32) -> Self {
        if age < 25 {
            Self::Under25
        } else if age < 55 {
            Self::From25To54
        } else {
            Self::From55
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Under25 => 0,
            Self::From25To54 => 1,
            Self::From55 => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Under25 => "<25",
            Self::From25To54 => "25-54",
            Self::From55 => "55+",
        }
    }
}

impl fmt::Display for AgeStratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sampled covariates and the evaluated linear predictor of a generated patient.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskProfile {
    pub alleles: AlleleCount,
    pub odds: RiskOdds,
    pub features: Vec<Contribution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    pub id: String,
    pub age: u32,
    /// Clamped to [15, 50] at generation.
    pub bmi_raw: f64,
    pub risk_assessment: f64,
    pub has_condition: bool,
    /// Present for generated patients only.
    pub profile: Option<RiskProfile>,
}

impl Patient {
    /// A patient as read back from a cohort export.
    pub fn loaded(
        id: String,
        age: u32,
        bmi_raw: f64,
        risk_assessment: f64,
        has_condition: bool,
    ) -> Self {
        Self {
            id,
            age,
            bmi_raw,
            risk_assessment,
            has_condition,
            profile: None,
        }
    }

    pub fn stratum(&self) -> AgeStratum {
        AgeStratum::of(self.age)
    }

    pub fn is_obese(&self) -> bool {
        self.bmi_raw >= OBESITY_THRESHOLD
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cohort {
    patients: Vec<Patient>,
}

impl Cohort {
    pub fn new(patients: Vec<Patient>) -> Self {
        Self { patients }
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Patient> {
        self.patients.iter()
    }

    /// Patients of a single stratum, in cohort order.
    pub fn stratum(&self, stratum: AgeStratum) -> impl Iterator<Item = &Patient> + '_ {
        self.patients.iter().filter(move |p| p.stratum() == stratum)
    }

    /// Patient counts indexed by [`AgeStratum::index`].
    pub fn stratum_counts(&self) -> [usize; 3] {
        let mut counts = [0usize; 3];
        for patient in &self.patients {
            counts[patient.stratum().index()] += 1;
        }
        counts
    }

    pub fn case_count(&self) -> usize {
        self.patients.iter().filter(|p| p.has_condition).count()
    }
}

impl<'a> IntoIterator for &'a Cohort {
    type Item = &'a Patient;
    type IntoIter = std::slice::Iter<'a, Patient>;

    fn into_iter(self) -> Self::IntoIter {
        self.patients.iter()
    }
}

/// Draws an age from the three-piece mixture: 18% uniform on [0, 14], 76%
/// uniform on [15, 80], 6% uniform on [81, 99].
pub fn sample_age<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    let selector: f64 = rng.sample(Standard);
    if selector < CHILD_SHARE {
        rng.gen_range(0..15)
    } else if selector < ADULT_CUMULATIVE_SHARE {
        rng.gen_range(15..81)
    } else {
        rng.gen_range(81..100)
    }
}

/// Draws a BMI from N(mean, 5) clamped to [15, 50]. `young_mean` applies below
/// age 25; older patients always use a mean of 27.
pub fn sample_bmi<R: Rng + ?Sized>(age: u32, young_mean: f64, rng: &mut R) -> f64 {
    let mean = if age < 25 { young_mean } else { ADULT_BMI_MEAN };
    let z: f64 = rng.sample(StandardNormal);
    (z * BMI_SD + mean).clamp(BMI_MIN, BMI_MAX)
}

/// Synthetic cohort generator.
///
/// Per patient, in cohort order, the shared generator is consumed as: age
/// selector, age, BMI, six calibration draws, allele dosage, smoking status.
/// Case status is then drawn for every patient in a second pass.
pub struct CohortGenerator<'a> {
    size: usize,
    young_bmi_mean: f64,
    calibration: &'a CalibrationTable,
    model: &'a RiskModel,
}

impl<'a> CohortGenerator<'a> {
    pub fn new(
        size: usize,
        young_bmi_mean: f64,
        calibration: &'a CalibrationTable,
        model: &'a RiskModel,
    ) -> Self {
        Self {
            size,
            young_bmi_mean,
            calibration,
            model,
        }
    }

    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        progress: &mut dyn ProgressObserver,
    ) -> Cohort {
        info!(
            "Generating {} synthetic patients (young-age BMI mean {}, BMI decay rate {})",
            self.size,
            self.young_bmi_mean,
            self.model.bmi_decay_rate()
        );

        progress.on_stage_start(SimulationStage::Generation, self.size);
        let mut patients = Vec::with_capacity(self.size);
        for i in 0..self.size {
            patients.push(self.generate_patient(i, rng));
            if (i + 1) % PROGRESS_INTERVAL == 0 {
                progress.on_stage_advance(SimulationStage::Generation, i + 1);
            }
        }
        progress.on_stage_finish(SimulationStage::Generation);

        progress.on_stage_start(SimulationStage::CaseAssignment, self.size);
        assign_case_status(&mut patients, rng);
        progress.on_stage_finish(SimulationStage::CaseAssignment);

        let cohort = Cohort::new(patients);
        debug!(
            "Generated cohort: {} cases, stratum sizes {:?}",
            cohort.case_count(),
            cohort.stratum_counts()
        );
        cohort
    }

    fn generate_patient<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Patient {
        let age = sample_age(rng);
        let bmi_raw = sample_bmi(age, self.young_bmi_mean, rng);
        let odds = self.calibration.sample_odds(rng);
        let alleles = AlleleCount::sample(rng);

        let assessment = self.model.assess(
            RiskInputs {
                age,
                bmi_raw,
                alleles,
                odds: &odds,
            },
            rng,
        );

        Patient {
            id: format!("P{index}"),
            age,
            bmi_raw,
            risk_assessment: assessment.probability,
            has_condition: false,
            profile: Some(RiskProfile {
                alleles,
                odds,
                features: assessment.features,
            }),
        }
    }
}

/// One Bernoulli draw per patient against its risk assessment, in cohort order.
fn assign_case_status<R: Rng + ?Sized>(patients: &mut [Patient], rng: &mut R) {
    for patient in patients.iter_mut() {
        let draw: f64 = rng.sample(Standard);
        patient.has_condition = draw < patient.risk_assessment;
    }
}
