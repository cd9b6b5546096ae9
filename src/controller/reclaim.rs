use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::registry::{ResourceKind, ResourceRegistry};
use crate::resources::environment::EnvironmentPool;
use crate::resources::{CertificateStore, Firewall};

/// One pass of reclamation, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimStep {
    SubEnvironments,
    Certificates,
    PortCertificateBindings,
    FirewallRules,
    ReopenControlPort,
}

impl fmt::Display for ReclaimStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReclaimStep::SubEnvironments => "sub-environments",
            ReclaimStep::Certificates => "certificates",
            ReclaimStep::PortCertificateBindings => "port-certificate-bindings",
            ReclaimStep::FirewallRules => "firewall-rules",
            ReclaimStep::ReopenControlPort => "reopen-control-port",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimFailure {
    pub step: ReclaimStep,
    /// The resource that failed, when the failure is tied to one.
    pub key: Option<String>,
    pub error: String,
}

/// What a reclamation pass did. Failures are informational only; every step
/// runs regardless.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub steps: Vec<ReclaimStep>,
    pub failures: Vec<ReclaimFailure>,
}

impl ReclaimReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, step: ReclaimStep, key: Option<String>, error: impl fmt::Display) {
        let error = error.to_string();
        warn!(
            class = %step,
            key = key.as_deref().unwrap_or("-"),
            error = %error,
            "reclamation step failed; continuing"
        );
        self.failures.push(ReclaimFailure { step, key, error });
    }
}

/// Ordered, best-effort release of everything this bridge instance owns.
pub struct Reclaimer<'a> {
    pub registry: &'a ResourceRegistry,
    pub environments: &'a EnvironmentPool,
    pub certificates: &'a dyn CertificateStore,
    pub firewall: &'a dyn Firewall,
    pub control_port: u16,
    /// Ports whose TLS binding is removed a second time, unconditionally.
    pub binding_ports: Vec<u16>,
    pub stop_timeout: Duration,
}

impl Reclaimer<'_> {
    /// Run every step in order. `force` is the terminal mode used at process
    /// exit: the registry is sealed first, certificates from earlier runs are
    /// purged, and the control port is left closed.
    pub async fn run(&self, force: bool) -> ReclaimReport {
        if force {
            self.registry.seal();
        }
        info!(force, "reclaiming bridge resources");

        let mut report = ReclaimReport::default();
        self.stop_environments(&mut report).await;
        self.uninstall_certificates(force, &mut report).await;
        self.remove_bindings(&mut report).await;
        self.remove_firewall_rules(&mut report).await;
        if !force {
            self.reopen_control_port(&mut report).await;
        }

        if report.is_clean() {
            info!("reclamation complete");
        } else {
            warn!(failures = report.failures.len(), "reclamation finished with failures");
        }
        report
    }

    async fn stop_environments(&self, report: &mut ReclaimReport) {
        let step = ReclaimStep::SubEnvironments;
        report.steps.push(step);

        for key in self.registry.drain(ResourceKind::SubEnvironment) {
            let Some(name) = key.as_name() else {
                continue;
            };
            let Some(mut env) = self.environments.take(name).await else {
                debug!(environment = %name, "environment already gone");
                continue;
            };

            match tokio::time::timeout(self.stop_timeout, env.stop()).await {
                Ok(Ok(())) => info!(environment = %name, "environment stopped"),
                Ok(Err(e)) => report.fail(step, Some(name.to_string()), e),
                Err(_) => {
                    report.fail(
                        step,
                        Some(name.to_string()),
                        format!("no acknowledgment within {:?}", self.stop_timeout),
                    );
                    env.kill();
                }
            }
        }
    }

    async fn uninstall_certificates(&self, force: bool, report: &mut ReclaimReport) {
        let step = ReclaimStep::Certificates;
        report.steps.push(step);

        let recorded = self.registry.drain(ResourceKind::Certificate);
        if force {
            if let Err(e) = self.certificates.uninstall_all(true).await {
                report.fail(step, None, e);
            }
            return;
        }

        for port in recorded.iter().filter_map(|k| k.as_port()) {
            if let Err(e) = self.certificates.uninstall(port).await {
                report.fail(step, Some(port.to_string()), e);
            }
        }
    }

    async fn remove_bindings(&self, report: &mut ReclaimReport) {
        let step = ReclaimStep::PortCertificateBindings;
        report.steps.push(step);

        for &port in &self.binding_ports {
            if let Err(e) = self.certificates.uninstall(port).await {
                report.fail(step, Some(port.to_string()), e);
            }
        }
    }

    async fn remove_firewall_rules(&self, report: &mut ReclaimReport) {
        let step = ReclaimStep::FirewallRules;
        report.steps.push(step);

        let ports: Vec<u16> = self
            .registry
            .drain(ResourceKind::FirewallRule)
            .iter()
            .filter_map(|k| k.as_port())
            .collect();
        if let Err(e) = self.firewall.remove_all_rules(&ports).await {
            report.fail(step, None, e);
        }
    }

    async fn reopen_control_port(&self, report: &mut ReclaimReport) {
        let step = ReclaimStep::ReopenControlPort;
        report.steps.push(step);

        if self.control_port == 0 {
            return;
        }
        let key = Some(self.control_port.to_string());
        match self.firewall.open_port(self.control_port).await {
            Ok(()) => {
                if let Err(e) = self
                    .registry
                    .record(ResourceKind::FirewallRule, self.control_port)
                {
                    report.fail(step, key, e);
                }
            }
            Err(e) => report.fail(step, key, e),
        }
    }
}
