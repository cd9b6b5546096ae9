use crate::common::*;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Config whose hooks and environment append to the project's hook log.
fn hooked_project(port: u16, https_port: u16) -> TestProject {
    hooked_project_with(port, https_port, |project| project.hook("install {port}"))
}

fn hooked_project_with(
    port: u16,
    https_port: u16,
    install_hook: impl Fn(&TestProject) -> String,
) -> TestProject {
    let project = TestProject::new("");
    let env_command = format!(
        "trap \"echo env-stopped >> '{}'; exit 0\" TERM; while true; do sleep 0.1; done",
        project.hook_log().display()
    );
    let config = format!(
        r#"
[bridge]
host = "127.0.0.1"
port = {port}
https_port = {https_port}
wss_port = 0
resource_folder = "{folder}"
stop_timeout = "5s"

[certificates]
install = "{install}"
uninstall = "{uninstall}"
purge = "{purge}"

[firewall]
open = "{open}"
remove = "{remove}"

[environments.harness]
command = '''{env_command}'''
"#,
        folder = project.dir.path().display(),
        install = install_hook(&project),
        uninstall = project.hook("uninstall {port}"),
        purge = project.hook("purge"),
        open = project.hook("open {port}"),
        remove = project.hook("remove {port}"),
    );
    std::fs::write(&project.config_path, config).unwrap();
    project
}

fn spawn_bridge(project: &TestProject) -> Child {
    Command::new(env!("CARGO_BIN_EXE_bridge"))
        .args(["serve", "-f", project.config_path.to_str().unwrap()])
        .kill_on_drop(true)
        .spawn()
        .expect("failed to start bridge")
}

#[tokio::test]
async fn delete_stops_bridge_and_reclaims_in_order() {
    let ports = free_ports(2);
    let (port, https_port) = (ports[0], ports[1]);
    let project = hooked_project(port, https_port);
    let mut child = spawn_bridge(&project);

    assert!(
        wait_for_port(port, Duration::from_secs(10)).await,
        "bridge did not listen on port {port}"
    );

    let resp = reqwest::Client::new()
        .delete(format!("http://127.0.0.1:{port}/bridge"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "\"The Bridge has closed.\"");

    let status = tokio::time::timeout(Duration::from_secs(15), child.wait())
        .await
        .expect("bridge did not exit in time")
        .expect("failed to wait on bridge");
    assert_eq!(status.code(), Some(0));

    assert_eq!(
        project.hook_lines(),
        vec![
            format!("open {port}"),
            format!("install {https_port}"),
            "env-stopped".to_string(),
            format!("uninstall {https_port}"),
            "purge".to_string(),
            format!("uninstall {https_port}"),
            format!("remove {port}"),
        ]
    );
    assert!(
        wait_for_port_release(port, Duration::from_secs(5)).await,
        "port {port} was not released after stop"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn sigint_reclaims_and_exits_130() {
    let ports = free_ports(2);
    let (port, https_port) = (ports[0], ports[1]);
    let project = hooked_project(port, https_port);
    let mut child = spawn_bridge(&project);

    assert!(
        wait_for_port(port, Duration::from_secs(10)).await,
        "bridge did not listen on port {port}"
    );

    let pid = child.id().unwrap();
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGINT,
    )
    .ok();

    let status = tokio::time::timeout(Duration::from_secs(15), child.wait())
        .await
        .expect("bridge did not exit in time")
        .expect("failed to wait on bridge");
    assert_eq!(status.code(), Some(130));

    let lines = project.hook_lines();
    assert!(lines.contains(&"env-stopped".to_string()), "log: {lines:?}");
    assert_eq!(lines.last(), Some(&format!("remove {port}")), "log: {lines:?}");
}

#[tokio::test]
async fn second_delete_is_rejected_while_first_drains() {
    let ports = free_ports(2);
    let project = hooked_project(ports[0], 0);
    let mut child = spawn_bridge(&project);
    let port = ports[0];

    assert!(
        wait_for_port(port, Duration::from_secs(10)).await,
        "bridge did not listen on port {port}"
    );

    let url = format!("http://127.0.0.1:{port}/bridge");
    let client = reqwest::Client::new();
    let (a, b) = tokio::join!(client.delete(&url).send(), client.delete(&url).send());

    // The loser may also see the connection close once shutdown begins.
    let statuses: Vec<u16> = [a, b]
        .into_iter()
        .filter_map(|r| r.ok().map(|resp| resp.status().as_u16()))
        .collect();
    assert_eq!(statuses.iter().filter(|s| **s == 200).count(), 1, "{statuses:?}");
    assert!(statuses.iter().all(|s| *s == 200 || *s == 400), "{statuses:?}");

    let status = tokio::time::timeout(Duration::from_secs(15), child.wait())
        .await
        .expect("bridge did not exit in time")
        .expect("failed to wait on bridge");
    assert_eq!(status.code(), Some(0));
}

#[cfg(unix)]
#[tokio::test]
async fn sigterm_during_startup_still_reclaims() {
    let ports = free_ports(2);
    let (port, https_port) = (ports[0], ports[1]);
    let project = hooked_project_with(port, https_port, |project| {
        format!("{}; sleep 2", project.hook("install {port}"))
    });
    let mut child = spawn_bridge(&project);

    let installing = format!("install {https_port}");
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !project.hook_lines().contains(&installing) {
        assert!(std::time::Instant::now() < deadline, "install hook never ran");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let pid = child.id().unwrap();
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGTERM,
    )
    .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(15), child.wait())
        .await
        .expect("bridge did not exit in time")
        .expect("failed to wait on bridge");
    assert_eq!(status.code(), Some(143));

    // The environment never starts once a stop is pending.
    assert_eq!(
        project.hook_lines(),
        vec![
            format!("open {port}"),
            format!("install {https_port}"),
            format!("uninstall {https_port}"),
            "purge".to_string(),
            format!("uninstall {https_port}"),
            format!("remove {port}"),
        ]
    );
}
