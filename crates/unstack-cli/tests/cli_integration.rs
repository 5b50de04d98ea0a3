//! CLI subprocess integration tests.
//!
//! These tests invoke the `unstack` binary as a subprocess and verify exit
//! codes, stdout content, and JSON output against the mock backend.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn unstack_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_unstack"));
    cmd.env_remove("UNSTACK_LOG");
    cmd
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("unstack.toml");
    std::fs::write(&path, body).unwrap();
    path
}

/// network <- {app, queue}, app <- web, plus an unrelated root.
fn write_test_config(dir: &Path) -> PathBuf {
    let key_dir = dir.join("ssh_keys");
    std::fs::create_dir_all(&key_dir).unwrap();
    std::fs::write(key_dir.join("bastion.pem"), "-----BEGIN KEY-----").unwrap();
    write_config(
        dir,
        &format!(
            r#"config_version = 1

[teardown]
poll_interval_ms = 10
max_attempts = 2

[keys]
local_dir = "{}"
names = ["bastion"]

[[stack]]
name = "network"

[[stack]]
name = "app"
depends_on = ["network"]

[[stack]]
name = "queue"
depends_on = ["network"]

[[stack]]
name = "web"
depends_on = ["app"]

[[stack]]
name = "dns"
"#,
            key_dir.display()
        ),
    )
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

#[test]
fn cli_version_exits_zero() {
    let output = unstack_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "unstack --version must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("unstack"),
        "version output must contain 'unstack': {stdout}"
    );
}

#[test]
fn cli_help_lists_commands() {
    let output = unstack_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["down", "plan", "status", "validate"] {
        assert!(stdout.contains(cmd), "help must list '{cmd}'");
    }
}

#[test]
fn cli_validate_accepts_good_config() {
    let project = tempfile::tempdir().unwrap();
    let config = write_test_config(project.path());

    let output = unstack_bin()
        .args(["--json", "validate", &config.to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["valid"], true);
    assert_eq!(json["stacks"], 5);
    assert_eq!(json["depth"], 3);
    assert_eq!(json["key_pairs"], 1);
}

#[test]
fn cli_validate_rejects_cycle_with_config_exit_code() {
    let project = tempfile::tempdir().unwrap();
    let config = write_config(
        project.path(),
        r#"config_version = 1

[[stack]]
name = "a"
depends_on = ["b"]

[[stack]]
name = "b"
depends_on = ["a"]
"#,
    );

    let output = unstack_bin()
        .args(["validate", &config.to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("circular dependency"), "stderr: {stderr}");
}

#[test]
fn cli_missing_config_exits_with_config_code() {
    let project = tempfile::tempdir().unwrap();
    let output = unstack_bin()
        .args([
            "plan",
            &project.path().join("nope.toml").to_string_lossy(),
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_plan_json_lists_children_first() {
    let project = tempfile::tempdir().unwrap();
    let config = write_test_config(project.path());

    let output = unstack_bin()
        .args(["--json", "plan", &config.to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["stacks"], 5);
    assert_eq!(
        json["waves"],
        serde_json::json!([["dns", "queue", "web"], ["app"], ["network"]])
    );
}

#[test]
fn cli_status_with_mock_reports_present() {
    let project = tempfile::tempdir().unwrap();
    let config = write_test_config(project.path());

    let output = unstack_bin()
        .args([
            "--json",
            "status",
            &config.to_string_lossy(),
            "--backend",
            "mock",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 5);
    assert!(entries.iter().all(|e| e["state"] == "present"));
}

#[test]
fn cli_down_with_mock_deletes_everything_and_keys() {
    let project = tempfile::tempdir().unwrap();
    let config = write_test_config(project.path());

    let output = unstack_bin()
        .args([
            "--json",
            "down",
            &config.to_string_lossy(),
            "--backend",
            "mock",
            "--yes",
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "down must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json = stdout_json(&output);
    assert_eq!(json["success"], true);
    assert_eq!(json["cancelled"], false);
    let outcomes = json["report"]["outcomes"].as_object().unwrap();
    assert_eq!(outcomes.len(), 5);
    for (name, outcome) in outcomes {
        assert_eq!(outcome["outcome"], "deleted", "{name} not deleted");
        assert_eq!(outcome["delete_requests"], 1);
    }
    assert_eq!(json["keys"]["deleted"], serde_json::json!(["bastion"]));
    assert!(!project.path().join("ssh_keys").exists());
}

#[test]
fn cli_down_keep_keys_leaves_key_dir() {
    let project = tempfile::tempdir().unwrap();
    let config = write_test_config(project.path());

    let output = unstack_bin()
        .args([
            "--json",
            "down",
            &config.to_string_lossy(),
            "--backend",
            "mock",
            "--yes",
            "--keep-keys",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert!(json["keys"].is_null());
    assert!(project.path().join("ssh_keys").join("bastion.pem").exists());
}

#[test]
fn cli_down_reports_teardown_when_key_dir_cannot_be_removed() {
    let project = tempfile::tempdir().unwrap();
    let config = write_test_config(project.path());
    let key_path = project.path().join("ssh_keys");
    std::fs::remove_dir_all(&key_path).unwrap();
    std::fs::write(&key_path, "not a directory").unwrap();

    let output = unstack_bin()
        .args([
            "--json",
            "down",
            &config.to_string_lossy(),
            "--backend",
            "mock",
            "--yes",
        ])
        .output()
        .unwrap();
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json = stdout_json(&output);
    assert_eq!(json["success"], true);
    assert_eq!(json["report"]["outcomes"].as_object().unwrap().len(), 5);
    assert!(json["keys"]["dir_error"]
        .as_str()
        .is_some_and(|e| e.contains("ssh_keys")));
    assert_eq!(json["keys"]["deleted"], serde_json::json!(["bastion"]));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not fully removed"), "stderr: {stderr}");
}

#[test]
fn cli_down_rejects_zero_poll_interval() {
    let project = tempfile::tempdir().unwrap();
    let config = write_test_config(project.path());

    let output = unstack_bin()
        .args([
            "down",
            &config.to_string_lossy(),
            "--backend",
            "mock",
            "--yes",
            "--poll-interval",
            "0",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--poll-interval"), "stderr: {stderr}");
    assert!(project.path().join("ssh_keys").exists());
}

#[test]
fn cli_validate_rejects_zero_poll_interval() {
    let project = tempfile::tempdir().unwrap();
    let config = write_config(
        project.path(),
        r#"config_version = 1

[teardown]
poll_interval_secs = 0

[[stack]]
name = "a"
"#,
    );

    let output = unstack_bin()
        .args(["validate", &config.to_string_lossy()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("poll interval"), "stderr: {stderr}");
}

#[test]
fn cli_down_refuses_without_confirmation_when_not_a_tty() {
    let project = tempfile::tempdir().unwrap();
    let config = write_test_config(project.path());

    let output = unstack_bin()
        .args(["down", &config.to_string_lossy(), "--backend", "mock"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--yes"), "stderr: {stderr}");
}

#[test]
fn cli_down_against_unreachable_remote_fails_and_keeps_keys() {
    let project = tempfile::tempdir().unwrap();
    let config = write_test_config(project.path());

    let output = unstack_bin()
        .args([
            "--json",
            "down",
            &config.to_string_lossy(),
            "--remote",
            "http://127.0.0.1:1",
            "--yes",
            "--max-attempts",
            "1",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let json = stdout_json(&output);
    assert_eq!(json["success"], false);
    let outcomes = &json["report"]["outcomes"];
    assert_eq!(outcomes["web"]["outcome"], "failed");
    assert_eq!(outcomes["web"]["error"]["kind"], "retry_budget_exhausted");
    // Parents of failed stacks are never touched.
    assert_eq!(outcomes["network"]["outcome"], "stranded");
    assert!(json["keys"].is_null());
    assert!(project.path().join("ssh_keys").exists());
}

#[test]
fn cli_unknown_backend_exits_with_remote_code() {
    let project = tempfile::tempdir().unwrap();
    let config = write_test_config(project.path());

    let output = unstack_bin()
        .args([
            "status",
            &config.to_string_lossy(),
            "--backend",
            "carrier-pigeon",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_completions_mention_binary() {
    let output = unstack_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("unstack"));
}

#[test]
fn cli_man_pages_written_per_subcommand() {
    let out = tempfile::tempdir().unwrap();
    let dir = out.path().join("man");
    let output = unstack_bin()
        .args(["man-pages", &dir.to_string_lossy()])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(dir.join("unstack.1").exists());
    assert!(dir.join("unstack-down.1").exists());
}
