use crate::common::*;
use assert_cmd::Command;
use std::time::Duration;

#[test]
fn validate_accepts_defaults() {
    let project = TestProject::new("[bridge]\nport = 45000\n");

    Command::cargo_bin("bridge")
        .unwrap()
        .args(["validate", "-f", project.config_path.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn validate_rejects_duplicate_ports() {
    let project = TestProject::new("[bridge]\nport = 45000\nhttps_port = 45000\n");

    Command::cargo_bin("bridge")
        .unwrap()
        .args(["validate", "-f", project.config_path.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn serve_refuses_an_invalid_config() {
    let project = TestProject::new("");
    let config = format!(
        "[bridge]\nport = 45000\nhttps_port = 45000\nmax_idle = \"bogus\"\n\n[firewall]\nopen = \"{}\"\n",
        project.hook("open {port}")
    );
    std::fs::write(&project.config_path, config).unwrap();

    let output = Command::cargo_bin("bridge")
        .unwrap()
        .args(["serve", "-f", project.config_path.to_str().unwrap()])
        .timeout(Duration::from_secs(10))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("duplicate_port"), "stderr: {stderr}");
    assert!(stderr.contains("invalid_duration"), "stderr: {stderr}");
    assert!(project.hook_lines().is_empty(), "nothing may be installed");
}

#[test]
fn missing_config_file_is_an_error() {
    Command::cargo_bin("bridge")
        .unwrap()
        .args(["serve", "-f", "/definitely/not/bridge.toml"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn completions_reference_binary_name() {
    let output = Command::cargo_bin("bridge")
        .unwrap()
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("bridge"));
}

#[tokio::test]
async fn show_and_stop_talk_to_a_running_bridge() {
    let port = free_port();
    let project = TestProject::new(&format!(
        "[bridge]\nhost = \"127.0.0.1\"\nport = {port}\nhttps_port = 0\nwss_port = 0\n"
    ));
    let config = project.config_path.to_str().unwrap().to_string();

    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_bridge"))
        .args(["serve", "-f", &config])
        .kill_on_drop(true)
        .spawn()
        .expect("failed to start bridge");
    assert!(
        wait_for_port(port, Duration::from_secs(10)).await,
        "bridge did not listen on port {port}"
    );

    let show = tokio::process::Command::new(env!("CARGO_BIN_EXE_bridge"))
        .args(["show", "-f", &config])
        .output()
        .await
        .unwrap();
    assert!(show.status.success());
    let listing = String::from_utf8_lossy(&show.stdout);
    assert!(listing.contains("BridgePort"), "got: {listing}");
    assert!(listing.contains(&port.to_string()), "got: {listing}");

    let stop = tokio::process::Command::new(env!("CARGO_BIN_EXE_bridge"))
        .args(["stop", "--url", &format!("http://127.0.0.1:{port}/bridge")])
        .output()
        .await
        .unwrap();
    assert!(stop.status.success());
    assert_eq!(
        String::from_utf8_lossy(&stop.stdout).trim(),
        "The Bridge has closed."
    );

    let status = tokio::time::timeout(Duration::from_secs(15), child.wait())
        .await
        .expect("bridge did not exit in time")
        .unwrap();
    assert_eq!(status.code(), Some(0));
}
