use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir) -> PathBuf {
    // identity scale calibration keeps the simulated grams readable, and a
    // short rail keeps moves quick
    let toml = r#"
[scale]
calibration = 1.0
offset = 0.0
glass_min_weight_g = 300.0

[motion]
max_speed_mm_s = 400.0

[protocol]
heartbeat_ms = 200
"#;
    let path = dir.path().join("barbot.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// Spawn the binary, feed it protocol lines on stdin, close stdin and
/// collect everything it printed.
fn session(config: &PathBuf, input: &str) -> String {
    let mut child = Command::cargo_bin("barbot")
        .unwrap()
        .arg("--config")
        .arg(config)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    // stdin drops here; the process exits once in-flight work resolves
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success(), "process failed: {:?}", out.status);
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn help_prints_usage() {
    Command::cargo_bin("barbot")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn get_commands_answer_synchronously() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir);
    let out = session(&config, "HasGlas.GetWeight.Bogus.");
    assert!(out.contains("ACK HasGlas 1"), "output: {out}");
    assert!(out.contains("ACK GetWeight 400"), "output: {out}");
    assert!(out.contains("NAK Bogus"), "output: {out}");
}

#[test]
fn move_command_completes_after_eof() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir);
    let out = session(&config, "Move 50.");
    assert!(out.contains("ACK Move"), "output: {out}");
    assert!(out.contains("DONE Move"), "output: {out}");
}

#[test]
fn draft_runs_to_done_against_the_simulator() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir);
    let out = session(&config, "Draft 0 20.");
    assert!(out.contains("ACK Draft"), "output: {out}");
    assert!(out.contains("DONE Draft"), "output: {out}");
}

#[rstest]
#[case("Draft 99 20.", "NAK Draft")]
#[case("Draft 0 9999.", "NAK Draft")]
#[case("Move abc.", "NAK Move")]
#[case("Mix 0.", "NAK Mix")]
#[case("Clean 0 50.", "NAK Clean")]
fn invalid_parameters_are_rejected(#[case] input: &str, #[case] expected: &str) {
    let dir = tempdir().unwrap();
    let config = write_config(&dir);
    let out = session(&config, input);
    assert!(out.contains(expected), "output: {out}");
}

#[test]
fn status_heartbeat_appears() {
    let dir = tempdir().unwrap();
    let config = write_config(&dir);
    // Delay keeps the loop alive past a couple of heartbeat periods
    let out = session(&config, "Delay 600.");
    assert!(out.contains("STATUS Delay"), "output: {out}");
    assert!(out.contains("DONE Delay"), "output: {out}");
}

#[test]
fn rejects_invalid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[motion]\nmicrosteps = 0\n").unwrap();
    Command::cargo_bin("barbot")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .assert()
        .failure();
}
