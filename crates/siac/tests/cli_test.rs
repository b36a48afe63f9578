//! Integration tests for the `siac` CLI binary.
//!
//! Argument parsing, help output, completions and error handling run
//! without a backend; the rest talk to a wiremock server.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `siac` binary with env isolation.
///
/// Clears all `SIAC_*` env vars and points config directories at `home`
/// so tests never touch the user's real configuration.
fn siac_cmd(home: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("siac");
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("NO_COLOR", "1")
        .env_remove("SIAC_PROFILE")
        .env_remove("SIAC_API_URL")
        .env_remove("SIAC_OUTPUT")
        .env_remove("SIAC_INSECURE")
        .env_remove("SIAC_TIMEOUT")
        .env_remove("SIAC_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

/// A command aimed at `server` with a bearer token from the environment.
fn backend_cmd(home: &TempDir, server: &MockServer) -> assert_cmd::Command {
    let mut cmd = siac_cmd(home);
    cmd.env("SIAC_API_URL", server.uri())
        .env("SIAC_TOKEN", "tok-cli");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run the command off the async runtime so the mock server keeps serving.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

fn device_json(id: &str, name: &str, status: &str) -> serde_json::Value {
    json!({
        "device_id": id,
        "name": name,
        "type": "esp32",
        "location": "lab",
        "tags": ["greenhouse"],
        "status": status,
        "last_seen": "2026-10-19T10:00:00Z"
    })
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = TempDir::new().unwrap();
    let output = siac_cmd(&home).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home).arg("--help").assert().success().stdout(
        predicate::str::contains("SIAC-IoT")
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("alerts"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("siac"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let home = TempDir::new().unwrap();
    let output = siac_cmd(&home).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_devices_list_without_backend_config() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["devices", "list"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No backend configured"));
}

#[test]
fn test_unknown_profile_is_reported() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["--profile", "lab", "alerts", "list"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Profile 'lab' not found"));
}

#[test]
fn test_invalid_output_format() {
    let home = TempDir::new().unwrap();
    let output = siac_cmd(&home)
        .args(["--output", "yaml", "devices", "list"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about valid output formats:\n{text}"
    );
}

#[test]
fn test_update_without_fields_is_rejected() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["--api-url", "http://127.0.0.1:9", "devices", "update", "esp32-1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nothing to update"));
}

#[test]
fn test_delete_requires_confirmation_when_not_interactive() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["--api-url", "http://127.0.0.1:9", "devices", "delete", "esp32-1"])
        .write_stdin("")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("requires confirmation"));
}

// ── Subcommand help discovery ───────────────────────────────────────

#[test]
fn test_devices_subcommands_exist() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["devices", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("get"))
                .and(predicate::str::contains("create"))
                .and(predicate::str::contains("update"))
                .and(predicate::str::contains("delete")),
        );
}

#[test]
fn test_alerts_subcommands_exist() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["alerts", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("acknowledge"))
                .and(predicate::str::contains("resolve")),
        );
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_without_file() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default_profile"));
}

#[test]
fn test_config_init_then_profiles() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["config", "init", "--name", "lab", "--api-url", "http://localhost:8000"])
        .assert()
        .success();

    siac_cmd(&home)
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* lab").and(predicate::str::contains("localhost:8000")));
}

#[test]
fn test_config_init_rejects_bad_url() {
    let home = TempDir::new().unwrap();
    siac_cmd(&home)
        .args(["config", "init", "--api-url", "not a url"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("api_url"));
}

// ── Against a mock backend ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_list_json() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/devices"))
        .and(header("authorization", "Bearer tok-cli"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            device_json("esp32-2", "Door", "offline"),
            device_json("esp32-1", "Greenhouse", "online"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.args(["--output", "json", "devices", "list"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let devices: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<&str> = devices
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["esp32-1", "esp32-2"]);
    assert_eq!(devices[0]["status"], "online");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_list_filters_by_status() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            device_json("esp32-1", "Greenhouse", "online"),
            device_json("esp32-2", "Door", "offline"),
        ])))
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.args(["--output", "plain", "devices", "list", "--status", "offline"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "esp32-2");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_update_reports_rejection() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/devices"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([device_json("esp32-1", "Greenhouse", "online")])),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/devices/esp32-1"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "detail": "database is locked" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.args(["devices", "update", "esp32-1", "--name", "Shed"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(1), "{}", combined_output(&output));
    let text = combined_output(&output);
    assert!(text.contains("rejected"), "{text}");
    assert!(text.contains("database is locked"), "{text}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_of_unknown_device_is_not_found() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.args(["devices", "update", "ghost", "--name", "Shed"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(4), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("devices list"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_acknowledge_prints_confirmed_alert() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    let alert = json!({
        "alert_id": "17",
        "device_id": "esp32-1",
        "ts": "2026-10-19T10:00:00Z",
        "severity": "high",
        "score": 0.93,
        "reason": "temperature spike"
    });
    let mut acked = alert.clone();
    acked["acknowledged"] = json!(true);

    Mock::given(method("GET"))
        .and(path("/api/v1/alerts/active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([alert])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/alerts/17/ack"))
        .respond_with(ResponseTemplate::new(200).set_body_json(acked))
        .expect(1)
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.args(["--output", "json", "alerts", "ack", "17"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let confirmed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(confirmed["id"], "17");
    assert_eq!(confirmed["acknowledged"], true);
    assert!(String::from_utf8_lossy(&output.stderr).contains("Alert acknowledged"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expired_session_points_at_login() {
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard_summary"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })),
        )
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.arg("summary");
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("siac login"));
}
