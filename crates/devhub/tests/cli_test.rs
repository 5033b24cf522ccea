//! Integration tests for the `devhub` CLI binary.
//!
//! Argument parsing, help output, shell completions and error handling run
//! without a hub; the command tests point `--url` at a wiremock hub.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `devhub` binary with env isolation.
///
/// Clears all `DEVHUB_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn devhub_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("devhub");
    cmd.env("HOME", "/tmp/devhub-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/devhub-cli-test-nonexistent")
        .env_remove("DEVHUB_PROFILE")
        .env_remove("DEVHUB_URL")
        .env_remove("DEVHUB_TOKEN")
        .env_remove("DEVHUB_USERNAME")
        .env_remove("DEVHUB_WORKSPACE")
        .env_remove("DEVHUB_OUTPUT")
        .env_remove("DEVHUB_INSECURE")
        .env_remove("DEVHUB_TIMEOUT");
    cmd
}

/// `devhub_cmd()` with hub flags pointing at `server`.
fn hub_cmd(server: &MockServer) -> assert_cmd::Command {
    let mut cmd = devhub_cmd();
    cmd.args(["--url", &server.uri(), "--token", "tok", "--username", "alice"]);
    cmd
}

/// Run a blocking assert_cmd invocation off the runtime driving the mock.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = devhub_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    devhub_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("control session")
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("control"))
            .and(predicate::str::contains("screenshot")),
    );
}

#[test]
fn test_version_flag() {
    devhub_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("devhub"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_zsh() {
    devhub_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_bash() {
    devhub_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = devhub_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_devices_list_without_config() {
    devhub_cmd()
        .args(["devices", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_invalid_output_format() {
    let output = devhub_cmd()
        .args(["--output", "invalid", "devices", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("invalid"));
}

#[test]
fn test_swipe_needs_points_or_direction() {
    let output = devhub_cmd().args(["swipe", "abc"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_swipe_rejects_both_forms() {
    let output = devhub_cmd()
        .args(["swipe", "abc", "--from", "1,2", "--to", "3,4", "--direction", "up"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_gesture_rejects_malformed_surface() {
    let output = devhub_cmd()
        .args(["gesture", "abc", "--surface", "0,0,300", "--down", "1,1", "--up", "2,2"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("WIDTHxHEIGHT"));
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn test_config_show_no_config() {
    // `config show` falls back to the default config when no file exists.
    devhub_cmd().args(["config", "show"]).assert().success();
}

#[test]
fn test_config_path() {
    devhub_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_use_unknown_profile() {
    let output = devhub_cmd()
        .args(["config", "use", "lab"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("Profile 'lab' not found"));
}

// ── Hub commands ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_list_plain() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/devices"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [
                { "udid": "b", "name": "Pixel 8", "connected": false },
                { "udid": "a", "name": "iPhone 15", "connected": true, "available": true }
            ]
        })))
        .mount(&server)
        .await;

    let mut cmd = hub_cmd(&server);
    cmd.args(["--output", "plain", "devices", "list"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "a\nb\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_list_status_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [
                { "udid": "a", "connected": true, "available": true },
                { "udid": "b", "connected": false }
            ]
        })))
        .mount(&server)
        .await;

    let mut cmd = hub_cmd(&server);
    cmd.args(["-o", "plain", "devices", "list", "--status", "offline"]);
    let output = run(cmd).await;

    assert_eq!(String::from_utf8_lossy(&output.stdout), "b\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tap_posts_coordinates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/device/abc/tap"))
        .and(body_json(json!({"x": 100, "y": 200})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Tap executed"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut cmd = hub_cmd(&server);
    cmd.args(["tap", "abc", "100", "200"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Tap executed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_gesture_dry_run_maps_without_sending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"devices": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/device/abc/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "UDID": "abc", "ScreenWidth": 1080, "ScreenHeight": 2340 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/device/abc/tap"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut cmd = hub_cmd(&server);
    cmd.args([
        "-o", "json-compact", "gesture", "abc", "--surface", "0,0,300x650", "--down",
        "150,325", "--up", "152,327", "--dry-run",
    ]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let intent: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(intent, json!({"kind": "tap", "at": {"x": 540, "y": 1170}}));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_device_exits_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/device/ghost/home"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "no such device"})))
        .mount(&server)
        .await;

    let mut cmd = hub_cmd(&server);
    cmd.args(["home", "ghost"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(4), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("device 'ghost' not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_token_exits_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/workspaces"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut cmd = hub_cmd(&server);
    cmd.arg("workspaces");
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}
