//! In-memory collaborators that record every call into a shared [`CallLog`].
//!
//! Used by the unit and HTTP tests to observe reclamation order and to inject
//! failures into individual resource classes. Compiled only for tests and
//! with the `testing` feature.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;

use super::{CertificateStore, EnvironmentError, Firewall, HookError, SubEnvironment};
use crate::controller::Collaborators;

/// Ordered record of collaborator calls, shared between fakes.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of calls starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBehavior {
    Acknowledge,
    Fail,
    /// Never acknowledges; only a timeout ends the wait.
    Hang,
}

pub struct FakeEnvironment {
    name: String,
    log: CallLog,
    behavior: StopBehavior,
}

impl FakeEnvironment {
    pub fn new(name: &str, log: &CallLog, behavior: StopBehavior) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            behavior,
        }
    }
}

impl SubEnvironment for FakeEnvironment {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), EnvironmentError>> {
        Box::pin(async move {
            self.log.push(format!("environment.stop {}", self.name));
            match self.behavior {
                StopBehavior::Acknowledge => Ok(()),
                StopBehavior::Fail => Err(EnvironmentError::Stop {
                    name: self.name.clone(),
                    reason: "refused".to_string(),
                }),
                StopBehavior::Hang => futures_util::future::pending().await,
            }
        })
    }

    fn kill(&mut self) {
        self.log.push(format!("environment.kill {}", self.name));
    }
}

pub struct FakeCertificateStore {
    log: CallLog,
    failing: bool,
}

impl FakeCertificateStore {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            failing: false,
        }
    }

    /// Every operation is recorded and then fails.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn outcome(&self) -> Result<(), HookError> {
        if self.failing {
            Err(HookError::Other("certificate store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl CertificateStore for FakeCertificateStore {
    fn install(&self, port: u16) -> BoxFuture<'_, Result<(), HookError>> {
        self.log.push(format!("certificate.install {}", port));
        Box::pin(async move { self.outcome() })
    }

    fn uninstall(&self, port: u16) -> BoxFuture<'_, Result<(), HookError>> {
        self.log.push(format!("certificate.uninstall {}", port));
        Box::pin(async move { self.outcome() })
    }

    fn uninstall_all(&self, force: bool) -> BoxFuture<'_, Result<(), HookError>> {
        self.log.push(format!("certificate.uninstall_all force={}", force));
        Box::pin(async move { self.outcome() })
    }
}

pub struct FakeFirewall {
    log: CallLog,
    failing: bool,
}

impl FakeFirewall {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            failing: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn outcome(&self) -> Result<(), HookError> {
        if self.failing {
            Err(HookError::Other("firewall unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Firewall for FakeFirewall {
    fn open_port(&self, port: u16) -> BoxFuture<'_, Result<(), HookError>> {
        self.log.push(format!("firewall.open {}", port));
        Box::pin(async move { self.outcome() })
    }

    fn remove_all_rules<'a>(&'a self, ports: &'a [u16]) -> BoxFuture<'a, Result<(), HookError>> {
        self.log.push(format!("firewall.remove_all {:?}", ports));
        Box::pin(async move { self.outcome() })
    }
}

impl Collaborators {
    /// In-memory collaborators that record every call into `log`.
    pub fn fake(log: &CallLog) -> Self {
        Self {
            certificates: Arc::new(FakeCertificateStore::new(log)),
            firewall: Arc::new(FakeFirewall::new(log)),
        }
    }
}
