use std::collections::BTreeSet;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

use super::{CertificateStore, Firewall, HookError};
use crate::config::model::{CertificateHooks, FirewallHooks};
use crate::platform;

/// A configurable shell command run for one resource operation.
#[derive(Debug, Clone)]
pub struct CommandHook {
    name: &'static str,
    template: Option<String>,
}

impl CommandHook {
    pub fn new(name: &'static str, template: Option<String>) -> Self {
        Self {
            name,
            template: template.filter(|t| !t.trim().is_empty()),
        }
    }

    fn is_configured(&self) -> bool {
        self.template.is_some()
    }

    /// Render the template with `vars` and run it. An unconfigured hook
    /// succeeds without doing anything.
    pub async fn run(&self, vars: &[(&str, String)]) -> Result<(), HookError> {
        let Some(template) = &self.template else {
            debug!(hook = self.name, "no command configured, skipping");
            return Ok(());
        };

        let command = platform::render_template(template, vars);
        debug!(hook = self.name, "running via {}: {}", platform::shell_name(), command);

        let output = platform::shell_command(&command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| HookError::Spawn {
                command: command.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(HookError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn unconfigured(hooks: &[&CommandHook]) -> Vec<&'static str> {
    hooks
        .iter()
        .filter(|hook| !hook.is_configured())
        .map(|hook| hook.name)
        .collect()
}

// ---------------------------------------------------------------------------
// CommandCertificateStore
// ---------------------------------------------------------------------------

pub struct CommandCertificateStore {
    install: CommandHook,
    uninstall: CommandHook,
    purge: CommandHook,
    authority: String,
    installed: Mutex<BTreeSet<u16>>,
}

impl CommandCertificateStore {
    pub fn new(hooks: &CertificateHooks, authority: &str) -> Self {
        Self {
            install: CommandHook::new("certificate-install", hooks.install.clone()),
            uninstall: CommandHook::new("certificate-uninstall", hooks.uninstall.clone()),
            purge: CommandHook::new("certificate-purge", hooks.purge.clone()),
            authority: authority.to_string(),
            installed: Mutex::new(BTreeSet::new()),
        }
    }

    /// Names of the hooks with no command; those operations are no-ops.
    pub fn unconfigured_hooks(&self) -> Vec<&'static str> {
        unconfigured(&[&self.install, &self.uninstall, &self.purge])
    }

    fn installed(&self) -> MutexGuard<'_, BTreeSet<u16>> {
        self.installed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn vars(&self, port: u16) -> Vec<(&'static str, String)> {
        vec![("port", port.to_string()), ("authority", self.authority.clone())]
    }
}

impl CertificateStore for CommandCertificateStore {
    fn install(&self, port: u16) -> BoxFuture<'_, Result<(), HookError>> {
        Box::pin(async move {
            self.install.run(&self.vars(port)).await?;
            self.installed().insert(port);
            info!(port, "certificate installed");
            Ok(())
        })
    }

    fn uninstall(&self, port: u16) -> BoxFuture<'_, Result<(), HookError>> {
        Box::pin(async move {
            self.uninstall.run(&self.vars(port)).await?;
            self.installed().remove(&port);
            info!(port, "certificate uninstalled");
            Ok(())
        })
    }

    fn uninstall_all(&self, force: bool) -> BoxFuture<'_, Result<(), HookError>> {
        Box::pin(async move {
            let ports: Vec<u16> = std::mem::take(&mut *self.installed()).into_iter().collect();
            let mut first_error = None;

            for port in ports {
                if let Err(e) = self.uninstall.run(&self.vars(port)).await {
                    warn!(port, error = %e, "failed to uninstall certificate");
                    first_error.get_or_insert(e);
                }
            }

            if force {
                let vars = [("authority", self.authority.clone())];
                if let Err(e) = self.purge.run(&vars).await {
                    warn!(error = %e, "failed to purge leftover certificates");
                    first_error.get_or_insert(e);
                }
            }

            first_error.map_or(Ok(()), Err)
        })
    }
}

// ---------------------------------------------------------------------------
// CommandFirewall
// ---------------------------------------------------------------------------

pub struct CommandFirewall {
    open: CommandHook,
    remove: CommandHook,
}

impl CommandFirewall {
    pub fn new(hooks: &FirewallHooks) -> Self {
        Self {
            open: CommandHook::new("firewall-open", hooks.open.clone()),
            remove: CommandHook::new("firewall-remove", hooks.remove.clone()),
        }
    }

    /// Names of the hooks with no command; those operations are no-ops.
    pub fn unconfigured_hooks(&self) -> Vec<&'static str> {
        unconfigured(&[&self.open, &self.remove])
    }
}

impl Firewall for CommandFirewall {
    fn open_port(&self, port: u16) -> BoxFuture<'_, Result<(), HookError>> {
        Box::pin(async move {
            self.open.run(&[("port", port.to_string())]).await?;
            info!(port, "firewall port opened");
            Ok(())
        })
    }

    fn remove_all_rules<'a>(&'a self, ports: &'a [u16]) -> BoxFuture<'a, Result<(), HookError>> {
        Box::pin(async move {
            let mut first_error = None;
            for port in ports {
                match self.remove.run(&[("port", port.to_string())]).await {
                    Ok(()) => info!(port = *port, "firewall rule removed"),
                    Err(e) => {
                        warn!(port = *port, error = %e, "failed to remove firewall rule");
                        first_error.get_or_insert(e);
                    }
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::platform::test_commands;
    use tempfile::TempDir;

    fn log_hook(dir: &TempDir, line: &str) -> Option<String> {
        let log = dir.path().join("hooks.log");
        Some(format!("echo \"{}\" >> {}", line, log.display()))
    }

    fn read_log(dir: &TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("hooks.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn unconfigured_hook_is_a_noop() {
        let hook = CommandHook::new("test", None);
        assert!(!hook.is_configured());
        hook.run(&[]).await.unwrap();

        let blank = CommandHook::new("test", Some("   ".to_string()));
        assert!(!blank.is_configured());
    }

    #[tokio::test]
    async fn failing_hook_reports_command_and_stderr() {
        let hook = CommandHook::new(
            "test",
            Some(format!("echo nope >&2; {}", test_commands::exit_failure())),
        );
        let err = hook.run(&[]).await.unwrap_err();
        match err {
            HookError::Failed { stderr, command, .. } => {
                assert_eq!(stderr, "nope");
                assert!(command.contains("exit 3"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn certificate_store_tracks_installed_ports() {
        let dir = TempDir::new().unwrap();
        let hooks = CertificateHooks {
            install: log_hook(&dir, "install {port} {authority}"),
            uninstall: log_hook(&dir, "uninstall {port}"),
            purge: log_hook(&dir, "purge {authority}"),
        };
        let store = CommandCertificateStore::new(&hooks, "TestCA");

        store.install(44285).await.unwrap();
        store.install(8084).await.unwrap();
        store.uninstall_all(false).await.unwrap();

        assert_eq!(
            read_log(&dir),
            vec![
                "install 44285 TestCA",
                "install 8084 TestCA",
                "uninstall 8084",
                "uninstall 44285",
            ]
        );
    }

    #[tokio::test]
    async fn forced_uninstall_all_purges_leftovers() {
        let dir = TempDir::new().unwrap();
        let hooks = CertificateHooks {
            install: None,
            uninstall: log_hook(&dir, "uninstall {port}"),
            purge: log_hook(&dir, "purge {authority}"),
        };
        let store = CommandCertificateStore::new(&hooks, "TestCA");

        store.uninstall_all(true).await.unwrap();
        assert_eq!(read_log(&dir), vec!["purge TestCA"]);
    }

    #[test]
    fn stores_name_their_unconfigured_hooks() {
        let dir = TempDir::new().unwrap();
        let certificates = CommandCertificateStore::new(
            &CertificateHooks {
                install: log_hook(&dir, "install {port}"),
                uninstall: None,
                purge: Some("  ".to_string()),
            },
            "TestCA",
        );
        assert_eq!(
            certificates.unconfigured_hooks(),
            vec!["certificate-uninstall", "certificate-purge"]
        );

        let firewall = CommandFirewall::new(&FirewallHooks::default());
        assert_eq!(firewall.unconfigured_hooks(), vec!["firewall-open", "firewall-remove"]);
    }

    #[tokio::test]
    async fn firewall_removes_every_port_despite_failures() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("hooks.log");
        let hooks = FirewallHooks {
            open: None,
            remove: Some(format!(
                "echo \"remove {{port}}\" >> {}; test {{port}} != 1",
                log.display()
            )),
        };
        let firewall = CommandFirewall::new(&hooks);

        let err = firewall.remove_all_rules(&[1, 2]).await.unwrap_err();
        assert!(matches!(err, HookError::Failed { .. }));
        assert_eq!(read_log(&dir), vec!["remove 1", "remove 2"]);
    }
}
