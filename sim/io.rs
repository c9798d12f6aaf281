//! # Cohort and Summary Files
//!
//! Both files are comma-delimited with a single header row.
//!
//! - Cohort: `id,age,bmi,risk,has_condition`, one row per patient. Columns are
//!   read by position; the header row is skipped, not interpreted.
//! - Summary: `mean,lower,upper`, one row per statistic in export order.
//!
//! Floating-point fields are written in shortest round-trip form, so reloading
//! an export reproduces every value bit for bit.

use crate::cohort::{Cohort, Patient};
use crate::interval::SummaryTable;
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use log::info;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const COHORT_HEADER: [&str; 5] = ["id", "age", "bmi", "risk", "has_condition"];
pub const SUMMARY_HEADER: [&str; 3] = ["mean", "lower", "upper"];

#[derive(Error, Debug)]
pub enum CohortIoError {
    #[error("Could not open or create '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed delimited data in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Line {line} of '{path}' has {found} columns, but {expected} are required.")]
    ColumnCount {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error(
        "Line {line} of '{path}': column '{column}' holds '{value}', which is not a valid {expected}."
    )]
    InvalidField {
        path: PathBuf,
        line: u64,
        column: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Reads a cohort export. Fails on the first malformed row.
pub fn load_cohort(path: &Path) -> Result<Cohort, CohortIoError> {
    let file = File::open(path).map_err(|source| CohortIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(BufReader::new(file));

    let mut patients = Vec::new();
    let mut record = StringRecord::new();
    loop {
        let more = reader
            .read_record(&mut record)
            .map_err(|source| CohortIoError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        if !more {
            break;
        }
        patients.push(parse_patient(path, &record)?);
    }

    info!("Loaded {} patients from {}", patients.len(), path.display());
    Ok(Cohort::new(patients))
}

fn parse_patient(path: &Path, record: &StringRecord) -> Result<Patient, CohortIoError> {
    let line = record.position().map_or(0, |p| p.line());
    if record.len() != COHORT_HEADER.len() {
        return Err(CohortIoError::ColumnCount {
            path: path.to_path_buf(),
            line,
            expected: COHORT_HEADER.len(),
            found: record.len(),
        });
    }

    let invalid = |index: usize, expected: &'static str| CohortIoError::InvalidField {
        path: path.to_path_buf(),
        line,
        column: COHORT_HEADER[index],
        value: record[index].to_string(),
        expected,
    };

    let id = record[0].to_string();
    let age = record[1]
        .parse::<u32>()
        .map_err(|_| invalid(1, "non-negative integer"))?;
    let bmi = record[2].parse::<f64>().map_err(|_| invalid(2, "number"))?;
    let risk = record[3].parse::<f64>().map_err(|_| invalid(3, "number"))?;
    let has_condition = match &record[4] {
        "0" => false,
        "1" => true,
        _ => return Err(invalid(4, "condition flag (0 or 1)")),
    };

    Ok(Patient::loaded(id, age, bmi, risk, has_condition))
}

fn create(path: &Path) -> Result<csv::Writer<BufWriter<File>>, CohortIoError> {
    let file = File::create(path).map_err(|source| CohortIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(WriterBuilder::new().from_writer(BufWriter::new(file)))
}

fn finish(path: &Path, mut writer: csv::Writer<BufWriter<File>>) -> Result<(), CohortIoError> {
    writer.flush().map_err(|source| CohortIoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a cohort in the layout [`load_cohort`] reads.
pub fn export_cohort(cohort: &Cohort, path: &Path) -> Result<(), CohortIoError> {
    let mut writer = create(path)?;
    let csv_error = |source: csv::Error| CohortIoError::Csv {
        path: path.to_path_buf(),
        source,
    };

    writer.write_record(COHORT_HEADER).map_err(csv_error)?;
    let mut bmi = ryu::Buffer::new();
    let mut risk = ryu::Buffer::new();
    for patient in cohort {
        let age = patient.age.to_string();
        let condition = if patient.has_condition { "1" } else { "0" };
        writer
            .write_record([
                patient.id.as_str(),
                age.as_str(),
                bmi.format(patient.bmi_raw),
                risk.format(patient.risk_assessment),
                condition,
            ])
            .map_err(csv_error)?;
    }
    finish(path, writer)?;

    info!("Exported {} patients to {}", cohort.len(), path.display());
    Ok(())
}

/// Writes the 13-row summary table.
pub fn export_summary(table: &SummaryTable, path: &Path) -> Result<(), CohortIoError> {
    let mut writer = create(path)?;
    let csv_error = |source: csv::Error| CohortIoError::Csv {
        path: path.to_path_buf(),
        source,
    };

    writer.write_record(SUMMARY_HEADER).map_err(csv_error)?;
    let mut buffers = [ryu::Buffer::new(), ryu::Buffer::new(), ryu::Buffer::new()];
    for row in table.rows() {
        let [mean, lower, upper] = &mut buffers;
        writer
            .write_record([
                mean.format(row.interval.median),
                lower.format(row.interval.lower),
                upper.format(row.interval.upper),
            ])
            .map_err(csv_error)?;
    }
    finish(path, writer)?;

    info!("Exported summary table to {}", path.display());
    Ok(())
}
