use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::ConfigError;

// Keys of the configuration dictionary served by `GET /bridge` and accepted
// by `POST /config`.
pub const KEY_HOST: &str = "BridgeHost";
pub const KEY_PORT: &str = "BridgePort";
pub const KEY_HTTP_PORT: &str = "BridgeHttpPort";
pub const KEY_HTTPS_PORT: &str = "BridgeHttpsPort";
pub const KEY_TCP_PORT: &str = "BridgeTcpPort";
pub const KEY_WEBSOCKET_PORT: &str = "BridgeWebSocketPort";
pub const KEY_WSS_PORT: &str = "BridgeSecureWebSocketPort";
pub const KEY_RESOURCE_FOLDER: &str = "BridgeResourceFolder";
pub const KEY_CERTIFICATE_AUTHORITY: &str = "BridgeCertificateAuthority";
pub const KEY_MAX_IDLE: &str = "BridgeMaxIdleTimeSpan";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub certificates: CertificateHooks,
    #[serde(default)]
    pub firewall: FirewallHooks,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    44283
}

fn default_http_port() -> u16 {
    8081
}

fn default_https_port() -> u16 {
    44285
}

fn default_tcp_port() -> u16 {
    809
}

fn default_websocket_port() -> u16 {
    8083
}

fn default_wss_port() -> u16 {
    8084
}

fn default_resource_folder() -> String {
    ".".to_string()
}

fn default_certificate_authority() -> String {
    "DO_NOT_TRUST_WcfBridgeRootCA".to_string()
}

fn default_max_idle() -> String {
    "24h".to_string()
}

fn default_stop_timeout() -> String {
    "5s".to_string()
}

fn default_drain_timeout() -> String {
    "5s".to_string()
}

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Live configuration of the bridge. This is what `GET /bridge` reports and
/// what `POST /config` mutates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_host")]
    pub host: String,
    /// Control port the bridge itself listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Port carrying the TLS certificate binding. 0 disables it.
    #[serde(default = "default_https_port")]
    pub https_port: u16,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,
    /// Secure-websocket port. 0 disables it.
    #[serde(default = "default_wss_port")]
    pub wss_port: u16,
    #[serde(default = "default_resource_folder")]
    pub resource_folder: String,
    #[serde(default = "default_certificate_authority")]
    pub certificate_authority: String,
    #[serde(default = "default_max_idle")]
    pub max_idle: String,
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: String,
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            http_port: default_http_port(),
            https_port: default_https_port(),
            tcp_port: default_tcp_port(),
            websocket_port: default_websocket_port(),
            wss_port: default_wss_port(),
            resource_folder: default_resource_folder(),
            certificate_authority: default_certificate_authority(),
            max_idle: default_max_idle(),
            stop_timeout: default_stop_timeout(),
            drain_timeout: default_drain_timeout(),
        }
    }
}

impl BridgeSettings {
    /// Flatten into the string dictionary exchanged over HTTP.
    pub fn to_dictionary(&self) -> BTreeMap<String, String> {
        [
            (KEY_HOST, self.host.clone()),
            (KEY_PORT, self.port.to_string()),
            (KEY_HTTP_PORT, self.http_port.to_string()),
            (KEY_HTTPS_PORT, self.https_port.to_string()),
            (KEY_TCP_PORT, self.tcp_port.to_string()),
            (KEY_WEBSOCKET_PORT, self.websocket_port.to_string()),
            (KEY_WSS_PORT, self.wss_port.to_string()),
            (KEY_RESOURCE_FOLDER, self.resource_folder.clone()),
            (KEY_CERTIFICATE_AUTHORITY, self.certificate_authority.clone()),
            (KEY_MAX_IDLE, self.max_idle.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// Apply dictionary updates in place. Returns whether any value changed.
    ///
    /// Every key is checked before anything is written, so an error leaves
    /// `self` untouched.
    pub fn apply_dictionary(
        &mut self,
        updates: &BTreeMap<String, String>,
    ) -> Result<bool, ConfigError> {
        let mut next = self.clone();
        for (key, value) in updates {
            match key.as_str() {
                KEY_HOST => next.host = value.clone(),
                KEY_PORT => next.port = parse_port(key, value)?,
                KEY_HTTP_PORT => next.http_port = parse_port(key, value)?,
                KEY_HTTPS_PORT => next.https_port = parse_port(key, value)?,
                KEY_TCP_PORT => next.tcp_port = parse_port(key, value)?,
                KEY_WEBSOCKET_PORT => next.websocket_port = parse_port(key, value)?,
                KEY_WSS_PORT => next.wss_port = parse_port(key, value)?,
                KEY_RESOURCE_FOLDER => next.resource_folder = value.clone(),
                KEY_CERTIFICATE_AUTHORITY => next.certificate_authority = value.clone(),
                KEY_MAX_IDLE => {
                    humantime::parse_duration(value).map_err(|e| ConfigError::InvalidValue {
                        key: key.clone(),
                        value: value.clone(),
                        reason: e.to_string(),
                    })?;
                    next.max_idle = value.clone();
                }
                _ => return Err(ConfigError::UnknownKey(key.clone())),
            }
        }

        let changed = next != *self;
        *self = next;
        Ok(changed)
    }

    /// Idle period after which the bridge stops itself. `None` when disabled.
    pub fn max_idle(&self) -> Option<Duration> {
        humantime::parse_duration(&self.max_idle)
            .ok()
            .filter(|d| !d.is_zero())
    }

    /// Bounded wait for a single sub-environment to acknowledge a stop.
    pub fn stop_timeout(&self) -> Duration {
        humantime::parse_duration(&self.stop_timeout).unwrap_or(DEFAULT_STOP_TIMEOUT)
    }

    /// How long the acknowledging response may take to drain before exit.
    pub fn drain_timeout(&self) -> Duration {
        humantime::parse_duration(&self.drain_timeout).unwrap_or(DEFAULT_DRAIN_TIMEOUT)
    }

    /// Nonzero ports that carry a TLS certificate binding.
    pub fn tls_binding_ports(&self) -> Vec<u16> {
        [self.https_port, self.wss_port]
            .into_iter()
            .filter(|p| *p != 0)
            .collect()
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Shell commands used to manage certificates. `{port}` is replaced with the
/// target port. A missing command makes the operation a logged no-op.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CertificateHooks {
    #[serde(default)]
    pub install: Option<String>,
    #[serde(default)]
    pub uninstall: Option<String>,
    /// Removes certificates left behind by earlier runs. Only used on a
    /// forced uninstall.
    #[serde(default)]
    pub purge: Option<String>,
}

/// Shell commands used to manage firewall rules. `{port}` is replaced with
/// the target port.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FirewallHooks {
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub remove: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnvironmentConfig {
    pub command: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
