//! CLI Interface E2E Tests
//!
//! Version output, option errors, status output, configuration files and
//! the demo workload.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn jboltctl_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_jboltctl"))
}

fn jboltctl() -> Command {
    let mut cmd = Command::new(jboltctl_bin());
    cmd.env_remove("JBOLTCTL_CONFIG")
        .env_remove("JBOLTCTL_LOG")
        .env_remove("JBOLT_USE")
        .env_remove("JBOLT_ORDER_FILE")
        .env_remove("JBOLT_CODE_HEAP_SIZE")
        .env_remove("JBOLT_RESCHEDULING");
    cmd
}

#[test]
fn test_cli_help() {
    jboltctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_version_without_jbolt() {
    jboltctl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("jboltctl "));
}

#[test]
fn test_version_with_jbolt() {
    jboltctl()
        .args(["-XX:+UnlockExperimentalVMOptions", "-XX:+UseJBolt", "--version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("jbolt "));
}

#[test]
fn test_unrecognized_vm_option() {
    jboltctl()
        .args(["-XX:+NoSuchFlag", "--version"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Unrecognized VM option '+NoSuchFlag'"))
        .stdout(predicate::str::contains("Could not create the Java Virtual Machine"));
}

#[test]
fn test_unrecognized_x_option() {
    jboltctl()
        .args(["-Xbogus", "--version"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Unrecognized option: -Xbogus"));
}

#[test]
fn test_dependent_option_without_use_jbolt() {
    jboltctl()
        .args(["-XX:JBoltCodeHeapSize=16M", "--version"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Error occurred during initialization of VM"))
        .stdout(predicate::str::contains(
            "Do not set VM option JBoltCodeHeapSize without UseJBolt enabled.",
        ));
}

#[test]
fn test_oversized_jbolt_heap_is_a_startup_error() {
    jboltctl()
        .args(["-XX:+UseJBolt", "-XX:JBoltCodeHeapSize=8589934592G", "--version"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "Improperly specified VM option 'JBoltCodeHeapSize=8589934592G'",
        ))
        .stdout(predicate::str::contains("Could not create the Java Virtual Machine"));
}

#[test]
fn test_conflicting_modes() {
    jboltctl()
        .args([
            "-XX:+UseJBolt",
            "-XX:+JBoltDumpMode",
            "-XX:+JBoltLoadMode",
            "--version",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "Do not set both JBoltDumpMode and JBoltLoadMode!",
        ));
}

#[test]
fn test_jbolt_requires_c2() {
    jboltctl()
        .args(["-XX:+UseJBolt", "-XX:TieredStopAtLevel=1", "--version"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("JBolt depends on C2!"));
}

#[test]
fn test_status_json() {
    let output = jboltctl()
        .args(["-XX:+UseJBolt", "--status"])
        .output()
        .expect("Failed to run jboltctl");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let start = stdout.find('{').expect("status JSON on stdout");
    let status: serde_json::Value =
        serde_json::from_str(&stdout[start..]).expect("valid status JSON");
    assert_eq!(status["mode"], "auto");

    let names: Vec<&str> = status["partitions"]
        .as_array()
        .expect("partition list")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert!(names.iter().any(|n| n.contains("jbolt hot")));
    assert!(names.iter().any(|n| n.contains("jbolt tmp")));
}

#[test]
fn test_demo_relocates() {
    jboltctl()
        .args(["-XX:+UseJBolt", "--demo", "20"])
        .assert()
        .success()
        .stdout(predicate::str::contains("relocated 20"));
}

#[test]
fn test_demo_without_jbolt() {
    jboltctl()
        .args(["--demo", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("JBolt is off"));
}

#[test]
fn test_dump_mode_writes_order_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let order = temp_dir.path().join("app.order");

    jboltctl()
        .arg("-XX:+UseJBolt")
        .arg("-XX:+JBoltDumpMode")
        .arg(format!("-XX:JBoltOrderFile={}", order.display()))
        .args(["--demo", "8"])
        .assert()
        .success();

    let content = std::fs::read_to_string(&order).expect("order file written");
    assert!(content.lines().any(|l| l.starts_with("M ") && l.contains("demo/Workload m7 ()V")));
}

#[test]
fn test_load_mode_missing_order_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let order = temp_dir.path().join("missing.order");

    jboltctl()
        .arg("-XX:+UseJBolt")
        .arg("-XX:+JBoltLoadMode")
        .arg(format!("-XX:JBoltOrderFile={}", order.display()))
        .arg("--version")
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "JBoltOrderFile does not exist or cannot be accessed!",
        ));
}

#[test]
fn test_config_file_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = temp_dir.path().join("jboltctl.toml");
    std::fs::write(&config, "[vm]\nUseJBolt = true\nJBoltRescheduling = \"06:15\"\n").unwrap();

    jboltctl()
        .arg("--config")
        .arg(&config)
        .args(["-Xlog:jbolt*=trace", "--version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set time trigger at 06:15"));
}

#[test]
fn test_command_line_overrides_config_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = temp_dir.path().join("jboltctl.toml");
    std::fs::write(&config, "[vm]\nUseJBolt = true\n").unwrap();

    jboltctl()
        .arg("--config")
        .arg(&config)
        .args(["-XX:-UseJBolt", "-XX:JBoltRescheduling=07:30", "--version"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "Do not set VM option JBoltRescheduling without UseJBolt enabled.",
        ));
}

#[test]
fn test_missing_config_file() {
    jboltctl()
        .args(["--config", "/nonexistent/jboltctl.toml", "--version"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Configuration file not found"));
}
