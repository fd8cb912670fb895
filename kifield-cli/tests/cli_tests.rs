//! CLI integration tests

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Build command for the kifield binary (finds it in target/debug when run via cargo test).
fn kifield_cli() -> Command {
    cargo_bin_cmd!("kifield")
}

/// Path to kifield library test fixtures (relative to workspace).
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("kifield")
        .join("tests")
        .join("fixtures")
}

#[test]
fn test_cli_help() {
    let mut cmd = kifield_cli();

    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("KiCad"))
        .stdout(predicate::str::contains("--nobackup"));
}

#[test]
fn test_cli_version() {
    for flag in ["--version", "-v"] {
        kifield_cli()
            .arg(flag)
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }
}

#[test]
fn test_cli_requires_extract_files() {
    let dir = TempDir::new().unwrap();
    let mut cmd = kifield_cli();

    cmd.arg("-i").arg(dir.path().join("out.csv"));
    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("-x"));
}

#[test]
fn test_cli_requires_insert_files() {
    let mut cmd = kifield_cli();

    cmd.arg("-x").arg(fixtures_dir().join("parts.csv"));
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("-i"));
}

#[test]
fn test_cli_nobackup_refuses_existing_file() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("bom.csv");
    fs::write(&target, "Refs,Value\n").unwrap();

    let mut cmd = kifield_cli();
    cmd.arg("-x")
        .arg(fixtures_dir().join("parts.csv"))
        .arg("-i")
        .arg(&target)
        .arg("--nobackup");

    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("--overwrite"));
    assert_eq!(fs::read_to_string(&target).unwrap(), "Refs,Value\n");
}

#[test]
fn test_cli_nobackup_with_overwrite() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("bom.csv");
    fs::write(&target, "Refs,Value\n").unwrap();

    let mut cmd = kifield_cli();
    cmd.arg("-x")
        .arg(fixtures_dir().join("parts.csv"))
        .arg("-i")
        .arg(&target)
        .arg("--nobackup")
        .arg("-w");

    cmd.assert().success();
    assert!(fs::read_to_string(&target).unwrap().contains("R1"));
    assert!(!dir.path().join("bom.csv.1.bak").exists());
}

#[test]
fn test_cli_insert_into_new_workbook() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("bom.tsv");

    let mut cmd = kifield_cli();
    cmd.arg("-x")
        .arg(fixtures_dir().join("parts.csv"))
        .arg("-i")
        .arg(&target)
        .arg("-g");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Parts: 4"));

    let written = fs::read_to_string(&target).unwrap();
    assert!(written.starts_with("Refs\t"));
    assert!(written.contains("R1"));
}

#[test]
fn test_cli_json_output() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("bom.csv");

    let mut cmd = kifield_cli();
    cmd.arg("-x")
        .arg(fixtures_dir().join("parts.csv"))
        .arg("-i")
        .arg(&target)
        .arg("--format")
        .arg("json");

    let output = cmd.output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["parts"], 4);
    assert_eq!(report["inserted_files"].as_array().map(Vec::len), Some(1));
}

#[test]
fn test_cli_field_filter() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("bom.csv");

    let mut cmd = kifield_cli();
    cmd.arg("-x")
        .arg(fixtures_dir().join("parts.csv"))
        .arg("-i")
        .arg(&target)
        .arg("-f")
        .arg("value");

    cmd.assert().success();
    let written = fs::read_to_string(&target).unwrap();
    assert!(written.starts_with("Refs,Value\n"));
    assert!(!written.contains("MPN"));
}
