use std::fs;
use std::process::Command;

use tempfile::tempdir;

#[test]
fn run_writes_cohort_and_summary() {
    let tmp = tempdir().expect("temporary directory");
    let cohort_path = tmp.path().join("cohort.csv");
    let summary_path = tmp.path().join("summary.csv");

    let exe = env!("CARGO_BIN_EXE_prevalon");
    let output = Command::new(exe)
        .args([
            "run",
            "--cohort-output",
            cohort_path.to_str().expect("path str"),
            "--output",
            summary_path.to_str().expect("path str"),
            "--patients",
            "2000",
            "--trials",
            "40",
            "--decay-rate",
            "-0.05",
            "--quiet",
        ])
        .output()
        .expect("run prevalon cli");

    assert!(
        output.status.success(),
        "CLI exited with {:?}",
        output.status
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cohort size: 2000"), "report missing: {stdout}");
    assert!(stdout.contains("GBD U.S. reference prevalence"));

    let cohort = fs::read_to_string(&cohort_path).expect("cohort file");
    let mut lines = cohort.lines();
    assert_eq!(lines.next(), Some("id,age,bmi,risk,has_condition"));
    assert_eq!(lines.count(), 2000);

    let summary = fs::read_to_string(&summary_path).expect("summary file");
    let mut lines = summary.lines();
    assert_eq!(lines.next(), Some("mean,lower,upper"));
    assert_eq!(lines.count(), 13);
}

#[test]
fn simulate_reports_malformed_rows() {
    let tmp = tempdir().expect("temporary directory");
    let cohort_path = tmp.path().join("cohort.csv");
    fs::write(
        &cohort_path,
        "id,age,bmi,risk,has_condition\nP0,40,27.0,0.004,1\nP1,41,x,0.004,0\n",
    )
    .expect("write cohort");

    let exe = env!("CARGO_BIN_EXE_prevalon");
    let output = Command::new(exe)
        .args([
            "simulate",
            "--cohort",
            cohort_path.to_str().expect("path str"),
            "--output",
            tmp.path().join("summary.csv").to_str().expect("path str"),
            "--trials",
            "10",
            "--quiet",
        ])
        .output()
        .expect("run prevalon cli");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "stderr: {stderr}");
    assert!(stderr.contains("Line 3"), "stderr: {stderr}");
    assert!(stderr.contains("bmi"), "stderr: {stderr}");
}

#[test]
fn zero_patients_is_rejected() {
    let tmp = tempdir().expect("temporary directory");
    let exe = env!("CARGO_BIN_EXE_prevalon");
    let output = Command::new(exe)
        .args([
            "generate",
            "--output",
            tmp.path().join("cohort.csv").to_str().expect("path str"),
            "--patients",
            "0",
            "--quiet",
        ])
        .output()
        .expect("run prevalon cli");

    assert_eq!(output.status.code(), Some(1));
    assert!(!tmp.path().join("cohort.csv").exists());
}

#[test]
fn generate_ignores_bootstrap_only_flags() {
    let tmp = tempdir().expect("temporary directory");
    let cohort_path = tmp.path().join("cohort.csv");
    let exe = env!("CARGO_BIN_EXE_prevalon");
    let output = Command::new(exe)
        .args([
            "generate",
            "--output",
            cohort_path.to_str().expect("path str"),
            "--patients",
            "500",
            "--trials",
            "1",
            "--quiet",
        ])
        .output()
        .expect("run prevalon cli");

    assert!(
        output.status.success(),
        "CLI exited with {:?}",
        output.status
    );
    let cohort = fs::read_to_string(&cohort_path).expect("cohort file");
    assert_eq!(cohort.lines().count(), 501);
}
