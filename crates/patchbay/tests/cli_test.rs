//! Integration tests for the `patchbay` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! scenario runs and error handling against throwaway config paths.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `patchbay` binary with env isolation.
///
/// Clears all `PATCHBAY_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn patchbay_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("patchbay");
    cmd.env("HOME", "/tmp/patchbay-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/patchbay-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("PATCHBAY_CONFIG")
        .env_remove("PATCHBAY_OUTPUT")
        .env_remove("PATCHBAY_MONITOR__AUTOSUBSCRIBE")
        .env_remove("PATCHBAY_MONITOR__POLL_INTERVAL")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_scenario(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("scenario.toml");
    std::fs::write(&path, body).unwrap();
    path
}

const CONNECT: &str = r#"
autosubscribe = "all"

[[devices]]
prefix = "osc"
outputs = [{ name = "out" }]

[[devices]]
prefix = "mixer"
inputs = [{ name = "in" }]

[[steps]]
action = "connect"
source = "osc.1/out"
dest = "mixer.1/in"

[[steps]]
action = "disconnect"
source = "osc.1/out"
dest = "mixer.1/in"
"#;

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = patchbay_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    patchbay_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("signal-routing network")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("flags"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    patchbay_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("patchbay"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    patchbay_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    patchbay_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Flags ───────────────────────────────────────────────────────────

#[test]
fn test_flags_decode_plain() {
    patchbay_cmd()
        .args(["flags", "decode", "0x07", "-o", "plain"])
        .assert()
        .success()
        .stdout("0x07 DEVICE|DEVICE_INPUTS|DEVICE_OUTPUTS\n");
}

#[test]
fn test_flags_encode_json() {
    let output = patchbay_cmd()
        .args(["flags", "encode", "device", "links_out", "-o", "json-compact"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["value"], 0x11);
    assert_eq!(value["hex"], "0x11");
}

#[test]
fn test_flags_list_table() {
    patchbay_cmd()
        .args(["flags", "list"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("DEVICE_CONNECTIONS_OUT")
                .and(predicate::str::contains("0x7F")),
        );
}

#[test]
fn test_flags_decode_rejects_undefined_bits() {
    patchbay_cmd()
        .args(["flags", "decode", "0x100"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("mask"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_no_config() {
    // A missing file renders the defaults.
    patchbay_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("poll_interval"));
}

#[test]
fn test_config_init_then_refuse_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patchbay").join("config.toml");
    let path_arg = path.to_str().unwrap();

    patchbay_cmd()
        .args(["--config", path_arg, "config", "init"])
        .assert()
        .success();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[monitor]"), "{written}");

    patchbay_cmd()
        .args(["--config", path_arg, "config", "init"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("--force"));

    patchbay_cmd()
        .args(["--config", path_arg, "config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_path_honors_flag() {
    patchbay_cmd()
        .args(["--config", "/tmp/somewhere/patchbay.toml", "config", "path"])
        .assert()
        .success()
        .stdout("/tmp/somewhere/patchbay.toml\n");
}

#[test]
fn test_invalid_config_value_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[monitor]\npoll_interval = \"eventually\"\n").unwrap();

    patchbay_cmd()
        .args(["--config", path.to_str().unwrap(), "config", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("monitor.poll_interval"));
}

// ── Watch ───────────────────────────────────────────────────────────

#[test]
fn test_watch_plain_reports_each_step() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write_scenario(dir.path(), CONNECT);

    patchbay_cmd()
        .args(["watch", scenario.to_str().unwrap(), "-o", "plain", "--settle", "20ms"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("0 + device osc.1")
                .and(predicate::str::contains("1 + link osc.1 -> mixer.1"))
                .and(predicate::str::contains("1 + connection osc.1/out -> mixer.1/in"))
                .and(predicate::str::contains("2 - connection osc.1/out -> mixer.1/in")),
        );
}

#[test]
fn test_watch_json_includes_cache_summary() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write_scenario(dir.path(), CONNECT);

    let output = patchbay_cmd()
        .args(["watch", scenario.to_str().unwrap(), "-o", "json", "--settle", "20ms"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["cache"]["devices"], 2);
    assert_eq!(report["cache"]["signals"], 2);
    assert_eq!(report["cache"]["ready"], 2);
    assert_eq!(report["cache"]["outputs"], 1);
    assert_eq!(report["cache"]["inputs"], 1);
    assert_eq!(report["cache"]["links"], 1);
    assert_eq!(report["cache"]["connections"], 0);
    assert!(report["events"].as_array().unwrap().len() >= 6);
}

#[test]
fn test_watch_without_autosubscribe_sees_devices_only_after_subscribe() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write_scenario(
        dir.path(),
        r#"
[[devices]]
prefix = "osc"
outputs = [{ name = "out" }]

[[steps]]
action = "subscribe"
device = "osc.1"
flags = "device|outputs"
"#,
    );

    let output = patchbay_cmd()
        .args(["watch", scenario.to_str().unwrap(), "-o", "plain", "--settle", "20ms"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("0 + device"), "{stdout}");
    assert!(stdout.contains("1 + device osc.1"), "{stdout}");
    assert!(stdout.contains("1 + signal osc.1/out"), "{stdout}");
}

#[test]
fn test_watch_missing_scenario() {
    patchbay_cmd()
        .args(["watch", "/tmp/patchbay-cli-test-nonexistent/none.toml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("scenario"));
}

#[test]
fn test_watch_unknown_local_device() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write_scenario(
        dir.path(),
        "[[steps]]\naction = \"remove_device\"\ndevice = \"ghost.1\"\n",
    );
    patchbay_cmd()
        .args(["watch", scenario.to_str().unwrap(), "--settle", "10ms"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("ghost.1"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = patchbay_cmd().arg("foobar").output().unwrap();
    assert!(
        !output.status.success(),
        "Expected failure for invalid subcommand"
    );
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    let output = patchbay_cmd()
        .args(["--output", "invalid", "flags", "list"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(text.contains("invalid"), "{text}");
}
