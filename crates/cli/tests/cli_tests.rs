//! CLI integration tests

use serde_json::json;
use std::process::{Command, Output};

/// Run onoffctl with an empty home directory and colors off
fn onoffctl(args: &[&str]) -> Output {
    let home = tempfile::tempdir().expect("Failed to create home directory");
    Command::new(env!("CARGO_BIN_EXE_onoffctl"))
        .args(args)
        .env("HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("KUBEONOFF_API_URL")
        .output()
        .expect("Failed to execute command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_cli_help() {
    let output = onoffctl(&["--help"]);
    let stdout = stdout(&output);

    assert!(output.status.success(), "CLI help should succeed");
    for command in [
        "status",
        "off",
        "on",
        "restart",
        "delete-pod",
        "delete-all-pods",
        "logs",
        "extensions",
    ] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
    assert!(stdout.contains("--api-url"));
}

#[test]
fn test_cli_version() {
    let output = onoffctl(&["--version"]);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout(&output).contains("onoffctl"));
}

#[test]
fn test_restart_help_shows_hard_flag() {
    let output = onoffctl(&["restart", "--help"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("--hard"));
}

#[test]
fn test_missing_argument() {
    let output = onoffctl(&["off"]);

    assert!(!output.status.success(), "Missing deployment name should fail");
}

#[test]
fn test_invalid_format() {
    let output = onoffctl(&["--format", "yaml", "status"]);

    assert!(!output.status.success());
}

#[test]
fn test_status_as_json() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/v1/all")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "deployments": {"items": [
                    {"metadata": {"name": "web", "uid": "W1"}, "spec": {"replicas": 2}}
                ]},
                "pods": {"items": []},
                "daemonsets": {"items": []},
                "replicasets": {"items": []},
                "replicaset_deployment_map": {},
                "metrics": null
            })
            .to_string(),
        )
        .create();

    let output = onoffctl(&["--api-url", &server.url(), "--format", "json", "status"]);

    mock.assert();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let printed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(printed["deployments"]["items"][0]["metadata"]["name"], "web");
}

#[test]
fn test_off_reports_saved_replicas() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/v1/deployments/web/off")
        .with_status(200)
        .with_body(
            json!({
                "metadata": {"name": "web", "annotations": {"kubeonoff/original-replicas": "3"}},
                "spec": {"replicas": 0}
            })
            .to_string(),
        )
        .create();

    let output = onoffctl(&["--api-url", &server.url(), "off", "web"]);

    mock.assert();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Stopped web (was 3 replicas)"));
}

#[test]
fn test_on_failure_shows_service_message() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/v1/deployments/web/on")
        .with_status(400)
        .with_body("deployment \"web\" wasn't stopped by onoff: annotation missing")
        .create();

    let output = onoffctl(&["--api-url", &server.url(), "on", "web"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("wasn't stopped by onoff"));
}

#[test]
fn test_hard_restart_lists_deletions() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/v1/deployments/web/hard-restart")
        .with_status(200)
        .with_body(
            json!({
                "deployment": {"metadata": {"name": "web"}},
                "deletions": [
                    {"pod_name": "web-1", "outcome": {"type": "success", "result": {}}},
                    {"pod_name": "web-2", "outcome": {
                        "type": "failure", "status": 404, "body": "not found"
                    }}
                ]
            })
            .to_string(),
        )
        .create();

    let output = onoffctl(&["--api-url", &server.url(), "restart", "web", "--hard"]);

    mock.assert();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("web-1"));
    assert!(stdout.contains("not found (404)"));
    assert!(stdout.contains("1 of 2 deletions failed"));
}

#[test]
fn test_logs_are_printed_verbatim() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/v1/pods/web-1/app/log")
        .match_query(mockito::Matcher::UrlEncoded(
            "timestamps".into(),
            "false".into(),
        ))
        .with_status(200)
        .with_body("first\nsecond\n")
        .create();

    let output = onoffctl(&["--api-url", &server.url(), "logs", "web-1", "app"]);

    mock.assert();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "first\nsecond\n");
}

#[test]
fn test_api_url_from_config_file() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/v1/kubeonoff/extensions")
        .with_status(200)
        .with_body(json!([{"name": "nightly"}]).to_string())
        .create();

    let home = tempfile::tempdir().unwrap();
    let config_dir = home.path().join(".config").join("onoffctl");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.json"),
        json!({"api_url": server.url()}).to_string(),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_onoffctl"))
        .arg("extensions")
        .env("HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("KUBEONOFF_API_URL")
        .output()
        .unwrap();

    mock.assert();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("/v1/kubeonoff/extensions/nightly/"));
}

#[test]
fn test_names_with_slashes_stay_one_path_segment() {
    let mut server = mockito::Server::new();
    let escaped = server
        .mock("DELETE", "/v1/pods/..%2F..%2Fkube-system%2Fpods%2Fcoredns")
        .with_status(400)
        .with_body("invalid object name")
        .create();
    let elsewhere = server
        .mock("DELETE", "/v1/kube-system/pods/coredns")
        .expect(0)
        .create();

    let output = onoffctl(&[
        "--api-url",
        &server.url(),
        "delete-pod",
        "../../kube-system/pods/coredns",
    ]);

    escaped.assert();
    elsewhere.assert();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("invalid object name"));
}

#[test]
fn test_dot_names_are_refused() {
    let mut server = mockito::Server::new();
    let any = server.mock("POST", mockito::Matcher::Any).expect(0).create();

    let output = onoffctl(&["--api-url", &server.url(), "off", ".."]);

    any.assert();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid name"));
}
