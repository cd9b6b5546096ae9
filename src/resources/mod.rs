//! Handles for the OS-level resources the bridge installs and later tears
//! down: sub-environments, TLS certificates and firewall rules.
//!
//! The controller only ever talks to these traits. Concrete implementations
//! live in [`environment`] (child processes) and [`hooks`] (shell command
//! hooks); `fake` records calls in memory for tests.

pub mod environment;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod hooks;

use futures_util::future::BoxFuture;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("failed to start environment `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to signal environment `{name}`: {source}")]
    Signal {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("environment `{name}` failed while stopping: {reason}")]
    Stop { name: String, reason: String },
}

/// An isolated execution context hosting test workloads, started and stopped
/// as a unit.
pub trait SubEnvironment: Send {
    fn name(&self) -> &str;

    /// Signal the environment to stop and resolve once it acknowledges.
    /// Callers bound the wait with their own timeout.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), EnvironmentError>>;

    /// Last-resort teardown after `stop` timed out.
    fn kill(&mut self) {}
}

/// Installs and removes the TLS certificate bound to a listening port.
pub trait CertificateStore: Send + Sync {
    fn install(&self, port: u16) -> BoxFuture<'_, Result<(), HookError>>;

    fn uninstall(&self, port: u16) -> BoxFuture<'_, Result<(), HookError>>;

    /// Remove every certificate this store installed. With `force`, also
    /// remove certificates left behind by earlier runs.
    fn uninstall_all(&self, force: bool) -> BoxFuture<'_, Result<(), HookError>>;
}

/// Opens and removes inbound firewall rules.
pub trait Firewall: Send + Sync {
    fn open_port(&self, port: u16) -> BoxFuture<'_, Result<(), HookError>>;

    /// Remove every rule this process added. `ports` lists the rules the
    /// registry recorded.
    fn remove_all_rules<'a>(&'a self, ports: &'a [u16]) -> BoxFuture<'a, Result<(), HookError>>;
}
