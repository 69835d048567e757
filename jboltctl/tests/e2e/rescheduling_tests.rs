//! JBoltRescheduling E2E Tests
//!
//! Each case starts the launcher with JBolt logging at trace and checks the
//! triggers it reports, or the startup error and exit status.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn jboltctl_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_jboltctl"))
}

fn run_with(rescheduling: &str, use_jbolt: bool) -> assert_cmd::assert::Assert {
    let mut cmd = Command::new(jboltctl_bin());
    cmd.env_remove("JBOLTCTL_CONFIG")
        .env_remove("JBOLT_USE")
        .env_remove("JBOLT_RESCHEDULING")
        .arg("-XX:+UnlockExperimentalVMOptions");
    if use_jbolt {
        cmd.arg("-XX:+UseJBolt");
    }
    cmd.arg(format!("-XX:JBoltRescheduling={}", rescheduling))
        .arg("-Xlog:jbolt*=trace")
        .arg("--version");
    cmd.assert()
}

/// Times from the `Set time trigger at HH:MM` lines, in output order
fn trigger_times(assert: &assert_cmd::assert::Assert) -> Vec<String> {
    const PREFIX: &str = "Set time trigger at ";
    String::from_utf8_lossy(&assert.get_output().stdout)
        .lines()
        .filter_map(|line| line.find(PREFIX).map(|at| line[at + PREFIX.len()..].trim().to_string()))
        .collect()
}

#[test]
fn test_three_triggers() {
    let assert = run_with("07:30,14:30,21:30", true).success();
    assert_eq!(trigger_times(&assert), vec!["07:30", "14:30", "21:30"]);

    let assert = run_with("21:30,07:30,14:30,07:30", true).success();
    assert_eq!(trigger_times(&assert), vec!["07:30", "14:30", "21:30"]);
}

#[test]
fn test_boundary_times() {
    run_with("00:30,01:30,02:30,03:30,04:30,05:30,06:30,07:30,08:30,09:30,10:30", true)
        .success()
        .stdout(predicate::str::contains("Set time trigger at 00:30"))
        .stdout(predicate::str::contains("Set time trigger at 09:30"));

    run_with("00:00,23:59", true)
        .success()
        .stdout(predicate::str::contains("Set time trigger at 00:00"))
        .stdout(predicate::str::contains("Set time trigger at 23:59"));
}

#[test]
fn test_duplicates_and_limit() {
    // 12 entries, one duplicate: ten distinct triggers survive
    run_with(
        "00:30,01:30,02:30,03:30,03:30,04:30,05:30,06:30,07:30,08:30,09:30,10:30",
        true,
    )
    .success()
    .stdout(predicate::str::contains("Set time trigger at 09:30"))
    .stdout(predicate::str::contains("Set time trigger at 10:30").not());
}

#[test]
fn test_requires_use_jbolt() {
    run_with("07:30,14:30,21:30", false)
        .code(1)
        .stdout(predicate::str::contains(
            "Do not set VM option JBoltRescheduling without UseJBolt enabled.",
        ));
}

#[test]
fn test_precondition_checked_before_syntax() {
    run_with("not-a-time", false)
        .code(1)
        .stdout(predicate::str::contains(
            "Do not set VM option JBoltRescheduling without UseJBolt enabled.",
        ))
        .stdout(predicate::str::contains("Invalid time").not());
}

#[test]
fn test_too_long() {
    let long_string = "a".repeat(1025);
    run_with(&long_string, true)
        .code(1)
        .stdout(predicate::str::contains("JBoltRescheduling is too long"));
}

#[test]
fn test_invalid_times() {
    for bad in ["12:303", "1:30", "12.30", "24:61"] {
        run_with(&format!("{},23:59", bad), true)
            .code(1)
            .stdout(predicate::str::contains(format!(
                "Invalid time {} in JBoltRescheduling",
                bad
            )));
    }
}
