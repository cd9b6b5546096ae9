use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Class of OS-level resource the bridge can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    SubEnvironment,
    Certificate,
    FirewallRule,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::SubEnvironment => write!(f, "sub-environment"),
            ResourceKind::Certificate => write!(f, "certificate"),
            ResourceKind::FirewallRule => write!(f, "firewall-rule"),
        }
    }
}

/// Identifies one resource within its class: environments by name,
/// certificates and firewall rules by port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKey {
    Name(String),
    Port(u16),
}

impl ResourceKey {
    pub fn as_port(&self) -> Option<u16> {
        match self {
            ResourceKey::Port(p) => Some(*p),
            ResourceKey::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            ResourceKey::Name(n) => Some(n),
            ResourceKey::Port(_) => None,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Name(n) => write!(f, "{}", n),
            ResourceKey::Port(p) => write!(f, "port {}", p),
        }
    }
}

impl From<u16> for ResourceKey {
    fn from(port: u16) -> Self {
        ResourceKey::Port(port)
    }
}

impl From<&str> for ResourceKey {
    fn from(name: &str) -> Self {
        ResourceKey::Name(name.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(name: String) -> Self {
        ResourceKey::Name(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry is sealed for shutdown; refusing to record {kind} {key}")]
    Sealed { kind: ResourceKind, key: ResourceKey },
}

#[derive(Debug, Default)]
struct ResourceSet {
    entries: BTreeMap<ResourceKind, Vec<ResourceKey>>,
    sealed: bool,
}

/// Resources this bridge instance installed, so teardown can find them again
/// without re-deriving them.
///
/// Keys keep their recording order within a class. Reclamation reads each
/// class destructively with [`drain`](Self::drain). Once [`seal`](Self::seal)
/// is called for a terminal shutdown nothing can be added back.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    inner: Mutex<ResourceSet>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResourceSet> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an owned resource. Recording the same key twice is a no-op.
    pub fn record(
        &self,
        kind: ResourceKind,
        key: impl Into<ResourceKey>,
    ) -> Result<(), RegistryError> {
        let key = key.into();
        let mut set = self.lock();
        if set.sealed {
            return Err(RegistryError::Sealed { kind, key });
        }
        let keys = set.entries.entry(kind).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
        Ok(())
    }

    /// Remove and return every key recorded for `kind`.
    pub fn drain(&self, kind: ResourceKind) -> Vec<ResourceKey> {
        self.lock().entries.remove(&kind).unwrap_or_default()
    }

    /// Copy of the keys currently recorded for `kind`.
    pub fn snapshot(&self, kind: ResourceKind) -> Vec<ResourceKey> {
        self.lock().entries.get(&kind).cloned().unwrap_or_default()
    }

    pub fn contains(&self, kind: ResourceKind, key: &ResourceKey) -> bool {
        self.lock()
            .entries
            .get(&kind)
            .is_some_and(|keys| keys.contains(key))
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.values().all(Vec::is_empty)
    }

    pub fn seal(&self) {
        self.lock().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }
}
