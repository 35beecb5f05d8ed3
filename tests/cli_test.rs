mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let config = common::fast_config()?;

    let mut cmd = Command::new(cargo_bin!("integration-hub"));
    cmd.arg("tests/fixtures/requests.csv")
        .arg("--config")
        .arg(config.path())
        .arg("--success-rate")
        .arg("1.0");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "id,external_id,source_system,target_system,status,error_detail,correlation_id",
        ))
        .stdout(predicate::str::contains(",EXT-001,PartnerA,Totvs,Completed,,"))
        .stdout(predicate::str::contains(",EXT-002,PartnerB,SAP,Completed,,"))
        .stdout(predicate::str::contains(",EXT-003,PartnerA,Salesforce,Completed,,"));

    Ok(())
}

#[test]
fn test_cli_reports_refused_deliveries() -> Result<(), Box<dyn std::error::Error>> {
    let config = common::fast_config()?;

    let mut cmd = Command::new(cargo_bin!("integration-hub"));
    cmd.arg("tests/fixtures/requests.csv")
        .arg("--config")
        .arg(config.path())
        .arg("--success-rate")
        .arg("0.0");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            ",EXT-001,PartnerA,Totvs,Failed,Failed to send data to external system 'Totvs',",
        ))
        .stdout(predicate::str::contains("Completed").not());

    Ok(())
}

#[test]
fn test_cli_flags_override_config_file() -> Result<(), Box<dyn std::error::Error>> {
    let input = common::requests_csv(&[["EXT-9", "PartnerA", "Totvs", "{}"]])?;

    // No config file: flags alone must keep the run fast.
    let mut cmd = Command::new(cargo_bin!("integration-hub"));
    cmd.arg(input.path())
        .arg("--success-rate")
        .arg("1")
        .arg("--preparation-delay-ms")
        .arg("0")
        .arg("--poll-interval-ms")
        .arg("10");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",EXT-9,PartnerA,Totvs,Completed,,"));

    Ok(())
}

#[test]
fn test_cli_rejects_invalid_success_rate() {
    let mut cmd = Command::new(cargo_bin!("integration-hub"));
    cmd.arg("tests/fixtures/requests.csv")
        .arg("--success-rate")
        .arg("1.5");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("success_rate"));
}

#[test]
fn test_cli_missing_input_fails() {
    let mut cmd = Command::new(cargo_bin!("integration-hub"));
    cmd.arg("tests/fixtures/does-not-exist.csv");

    cmd.assert().failure();
}
