//! The bridge's lifecycle controller.
//!
//! One [`Controller`] is built at process entry and shared with the HTTP
//! layer behind an `Arc`. It owns the live configuration, the
//! Running → Stopping gate, the registry of installed resources and the live
//! sub-environment handles, and it is the only thing that runs reclamation.

pub mod idle;
pub mod reclaim;
pub mod registry;
pub mod state;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::model::{BridgeConfig, BridgeSettings, EnvironmentConfig};
use crate::config::validate::duplicate_ports;
use crate::config::ConfigError;
use crate::platform;
use crate::resources::environment::{EnvironmentPool, ProcessEnvironment};
use crate::resources::hooks::{CommandCertificateStore, CommandFirewall};
use crate::resources::{CertificateStore, Firewall, SubEnvironment};

use idle::ActivityClock;
use reclaim::{ReclaimReport, Reclaimer};
use registry::{ResourceKind, ResourceRegistry};
use state::{ExitListener, ExitReason, ProcessState, ShutdownGate, StopDecision};

/// Certificate store and firewall the controller drives.
pub struct Collaborators {
    pub certificates: Arc<dyn CertificateStore>,
    pub firewall: Arc<dyn Firewall>,
}

impl Collaborators {
    /// Shell-hook collaborators described by the `[certificates]` and
    /// `[firewall]` sections.
    pub fn from_config(config: &BridgeConfig) -> Self {
        let certificates =
            CommandCertificateStore::new(&config.certificates, &config.bridge.certificate_authority);
        let firewall = CommandFirewall::new(&config.firewall);

        let mut unconfigured = certificates.unconfigured_hooks();
        unconfigured.extend(firewall.unconfigured_hooks());
        if !unconfigured.is_empty() {
            info!(hooks = ?unconfigured, "no command configured; these operations are skipped");
        }

        Self {
            certificates: Arc::new(certificates),
            firewall: Arc::new(firewall),
        }
    }
}

/// Why a configuration update was refused.
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("Bridge is already stopping.")]
    Stopping,
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

pub struct Controller {
    settings: RwLock<BridgeSettings>,
    environment_configs: BTreeMap<String, EnvironmentConfig>,
    gate: ShutdownGate,
    registry: ResourceRegistry,
    environments: EnvironmentPool,
    collaborators: Collaborators,
    activity: ActivityClock,
    /// Serializes configuration resets with each other and with the
    /// terminal reclaim.
    reset_lock: Mutex<()>,
    reclaimed: AtomicBool,
}

impl Controller {
    /// Build the controller for a loaded config file. The returned listener
    /// resolves when the process should exit.
    pub fn new(config: &BridgeConfig) -> (Arc<Self>, ExitListener) {
        Self::build(
            config.bridge.clone(),
            config.environments.clone(),
            Collaborators::from_config(config),
        )
    }

    /// Build a controller with no configured environments around the given
    /// collaborators.
    pub fn with_collaborators(
        settings: BridgeSettings,
        collaborators: Collaborators,
    ) -> (Arc<Self>, ExitListener) {
        Self::build(settings, BTreeMap::new(), collaborators)
    }

    fn build(
        settings: BridgeSettings,
        environment_configs: BTreeMap<String, EnvironmentConfig>,
        collaborators: Collaborators,
    ) -> (Arc<Self>, ExitListener) {
        let (gate, listener) = ShutdownGate::new();
        let controller = Self {
            settings: RwLock::new(settings),
            environment_configs,
            gate,
            registry: ResourceRegistry::new(),
            environments: EnvironmentPool::new(),
            collaborators,
            activity: ActivityClock::new(),
            reset_lock: Mutex::new(()),
            reclaimed: AtomicBool::new(false),
        };
        (Arc::new(controller), listener)
    }

    // -- Queries -------------------------------------------------------------

    pub async fn settings(&self) -> BridgeSettings {
        self.settings.read().await.clone()
    }

    /// The configuration dictionary served by `GET /bridge`.
    pub async fn dictionary(&self) -> BTreeMap<String, String> {
        self.settings.read().await.to_dictionary()
    }

    pub fn state(&self) -> ProcessState {
        self.gate.state()
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn activity(&self) -> &ActivityClock {
        &self.activity
    }

    pub async fn drain_timeout(&self) -> Duration {
        self.settings.read().await.drain_timeout()
    }

    // -- Installation --------------------------------------------------------

    /// Open the control port in the firewall and record the rule.
    pub async fn open_control_port(&self) -> Result<()> {
        let port = self.settings.read().await.port;
        self.collaborators
            .firewall
            .open_port(port)
            .await
            .with_context(|| format!("opening control port {} in the firewall", port))?;
        self.registry.record(ResourceKind::FirewallRule, port)?;
        Ok(())
    }

    /// Install the certificate bound to the https port, if one is configured.
    pub async fn install_tls_binding(&self) -> Result<()> {
        let port = self.settings.read().await.https_port;
        if port == 0 {
            debug!("https port disabled; no certificate to install");
            return Ok(());
        }
        self.collaborators
            .certificates
            .install(port)
            .await
            .with_context(|| format!("installing certificate for port {}", port))?;
        self.registry.record(ResourceKind::Certificate, port)?;
        Ok(())
    }

    /// Take ownership of a running sub-environment so reclamation stops it.
    pub async fn adopt_environment(&self, mut env: Box<dyn SubEnvironment>) -> Result<()> {
        let name = env.name().to_string();
        if let Err(e) = self.registry.record(ResourceKind::SubEnvironment, name.as_str()) {
            env.kill();
            return Err(e.into());
        }
        if let Some(mut replaced) = self.environments.insert(env).await {
            warn!(environment = %name, "replacing environment with the same name");
            replaced.kill();
        }
        Ok(())
    }

    /// Start every configured environment in the resource folder. Failures
    /// are logged; the environments that did start are still owned.
    pub async fn start_environments(&self) {
        let folder = PathBuf::from(platform::expand_home(
            &self.settings.read().await.resource_folder,
        ));
        for (name, config) in &self.environment_configs {
            match ProcessEnvironment::spawn(name, config, &folder) {
                Ok(env) => {
                    if let Err(e) = self.adopt_environment(Box::new(env)).await {
                        warn!(environment = %name, error = %e, "environment not adopted");
                    }
                }
                Err(e) => warn!(environment = %name, error = %e, "failed to start environment"),
            }
        }
    }

    // -- Stopping ------------------------------------------------------------

    /// Attempt Running → Stopping and build the caller's response from the
    /// decision while the transition is still locked.
    pub fn respond_to_stop<R>(&self, respond: impl FnOnce(StopDecision) -> R) -> R {
        self.gate.respond_to_stop(respond)
    }

    pub fn request_stop(&self) -> StopDecision {
        self.gate.request_stop()
    }

    /// Stop without an HTTP caller to acknowledge, exiting with `code`.
    /// Returns false if the bridge was already stopping.
    pub fn force_stop(&self, code: i32, reason: ExitReason) -> bool {
        match self.gate.request_stop() {
            StopDecision::Accepted(trigger) => {
                info!(code, %reason, "stopping bridge");
                trigger.fire(code, reason);
                true
            }
            StopDecision::AlreadyStopping => {
                debug!(%reason, "bridge already stopping");
                false
            }
        }
    }

    // -- Configuration reset -------------------------------------------------

    /// Apply a configuration update. If anything changed, resources are
    /// released with a non-terminal reclaim before the new values take effect,
    /// then the https certificate and the configured environments are
    /// installed again. Returns the resulting dictionary.
    pub async fn apply_configuration(
        &self,
        updates: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, ResetError> {
        let _reset = self.reset_lock.lock().await;
        if self.state() == ProcessState::Stopping {
            return Err(ResetError::Stopping);
        }

        let current = self.settings().await;
        let mut next = current.clone();
        let changed = next.apply_dictionary(updates)?;
        if next.port == 0 {
            return Err(ConfigError::Rejected("control port must not be 0".to_string()).into());
        }
        if next.port != current.port {
            return Err(ConfigError::Rejected(format!(
                "control port cannot change while the bridge is listening on {}",
                current.port
            ))
            .into());
        }
        if let Some((port, roles)) = duplicate_ports(&next).into_iter().next() {
            return Err(ConfigError::Rejected(format!(
                "port {} is assigned to {}",
                port,
                roles.join(", ")
            ))
            .into());
        }

        if !changed {
            debug!("configuration unchanged");
            return Ok(next.to_dictionary());
        }

        info!("configuration changed; releasing bridge resources");
        self.reclaim(false).await;
        *self.settings.write().await = next.clone();

        if let Err(e) = self.install_tls_binding().await {
            warn!(error = %e, "failed to reinstall certificate after reset");
        }
        self.start_environments().await;

        Ok(next.to_dictionary())
    }

    // -- Reclamation ---------------------------------------------------------

    /// Run one reclamation pass against the current settings.
    ///
    /// Not serialized against resets; use [`shutdown`](Self::shutdown) for
    /// the terminal pass.
    pub async fn reclaim(&self, force: bool) -> ReclaimReport {
        let settings = self.settings().await;
        Reclaimer {
            registry: &self.registry,
            environments: &self.environments,
            certificates: self.collaborators.certificates.as_ref(),
            firewall: self.collaborators.firewall.as_ref(),
            control_port: settings.port,
            binding_ports: settings.tls_binding_ports(),
            stop_timeout: settings.stop_timeout(),
        }
        .run(force)
        .await
    }

    /// The terminal reclaim. Runs at most once, and only after the bridge has
    /// entered Stopping; later calls return `None`.
    pub async fn shutdown(&self) -> Option<ReclaimReport> {
        if self.state() != ProcessState::Stopping {
            warn!("shutdown requested while the bridge is still running; ignoring");
            return None;
        }
        let _reset = self.reset_lock.lock().await;
        if self.reclaimed.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.reclaim(true).await)
    }
}
