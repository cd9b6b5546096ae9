// The miette/thiserror derive macros generate code that triggers false
// positive unused_assignments warnings on enum variant fields.
#![allow(unused_assignments)]

use std::collections::BTreeMap;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::config::model::{BridgeConfig, BridgeSettings};

// ---------------------------------------------------------------------------
// ConfigDiagnostic: miette-powered validation error
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigDiagnostic {
    #[error("control port must not be 0")]
    #[diagnostic(
        code(bridge::zero_control_port),
        help("the bridge needs a fixed port so the harness can reach it")
    )]
    ZeroControlPort {
        #[source_code]
        src: NamedSource<String>,
        #[label("control port")]
        span: SourceSpan,
    },

    #[error("port {port} is used by multiple listeners: {roles:?}")]
    #[diagnostic(code(bridge::duplicate_port))]
    DuplicatePort {
        #[source_code]
        src: NamedSource<String>,
        #[label("duplicate port")]
        span: SourceSpan,
        port: u16,
        roles: Vec<String>,
    },

    #[error("environment `{environment}` has an empty command")]
    #[diagnostic(code(bridge::empty_command))]
    EmptyEnvironmentCommand {
        #[source_code]
        src: NamedSource<String>,
        #[label("empty command")]
        span: SourceSpan,
        environment: String,
    },

    #[error("invalid duration `{value}` for `{field}`")]
    #[diagnostic(
        code(bridge::invalid_duration),
        help("use a humantime duration such as \"250ms\", \"5s\" or \"24h\"")
    )]
    InvalidDuration {
        #[source_code]
        src: NamedSource<String>,
        #[label("{reason}")]
        span: SourceSpan,
        field: String,
        value: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Source span helpers
// ---------------------------------------------------------------------------

/// Span of the value assigned to `key` on the first line of the form
/// `key = value`. Falls back to the start of the file.
fn find_key_value(source: &str, key: &str) -> SourceSpan {
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix(key) {
            if rest.trim_start().starts_with('=') {
                let eq = line.find('=').unwrap_or(0);
                let value = line[eq + 1..].trim();
                let start = offset + line.find(value).unwrap_or(eq + 1);
                return (start, value.len()).into();
            }
        }
        offset += line.len();
    }
    (0, 0).into()
}

/// Span of the `[environments.<name>]` table header.
fn find_environment(source: &str, name: &str) -> SourceSpan {
    let header = format!("[environments.{}]", name);
    match source.find(&header) {
        Some(start) => (start, header.len()).into(),
        None => (0, 0).into(),
    }
}

// ---------------------------------------------------------------------------
// Shared checks
// ---------------------------------------------------------------------------

/// Nonzero ports claimed by more than one listener, with the listener names.
pub fn duplicate_ports(settings: &BridgeSettings) -> Vec<(u16, Vec<String>)> {
    let listeners = [
        ("port", settings.port),
        ("https_port", settings.https_port),
        ("wss_port", settings.wss_port),
    ];
    let mut by_port: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    for (role, port) in listeners {
        if port != 0 {
            by_port.entry(port).or_default().push(role.to_string());
        }
    }
    by_port
        .into_iter()
        .filter(|(_, roles)| roles.len() > 1)
        .collect()
}

// ---------------------------------------------------------------------------
// Main validation function
// ---------------------------------------------------------------------------

pub fn validate(
    config: &BridgeConfig,
    source: &str,
    filename: &str,
) -> Result<(), Vec<ConfigDiagnostic>> {
    let mut errors = Vec::new();
    let src = NamedSource::new(filename, source.to_string());
    let settings = &config.bridge;

    if settings.port == 0 {
        errors.push(ConfigDiagnostic::ZeroControlPort {
            src: src.clone(),
            span: find_key_value(source, "port"),
        });
    }

    for (port, roles) in duplicate_ports(settings) {
        let first = roles.last().cloned().unwrap_or_default();
        errors.push(ConfigDiagnostic::DuplicatePort {
            src: src.clone(),
            span: find_key_value(source, &first),
            port,
            roles,
        });
    }

    let durations = [
        ("max_idle", &settings.max_idle),
        ("stop_timeout", &settings.stop_timeout),
        ("drain_timeout", &settings.drain_timeout),
    ];
    for (field, value) in durations {
        if let Err(e) = humantime::parse_duration(value) {
            errors.push(ConfigDiagnostic::InvalidDuration {
                src: src.clone(),
                span: find_key_value(source, field),
                field: field.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            });
        }
    }

    for (name, env) in &config.environments {
        if env.command.trim().is_empty() {
            errors.push(ConfigDiagnostic::EmptyEnvironmentCommand {
                src: src.clone(),
                span: find_environment(source, name),
                environment: name.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
