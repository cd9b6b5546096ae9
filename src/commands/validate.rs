use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

use crate::config;
use crate::config::resolve::{resolve_config, CONFIG_FILENAME};
use crate::config::validate::{validate, ConfigDiagnostic};

pub fn run(config_file: Option<&Path>) -> Result<()> {
    let Some(config_path) = resolve_config(config_file)? else {
        anyhow::bail!(
            "no {} found in the current directory or its parents",
            CONFIG_FILENAME
        );
    };

    let (config, source) = config::load_config(&config_path)?;
    let filename = display_name(&config_path);

    match validate(&config, &source, &filename) {
        Ok(()) => {
            println!(
                "  {} {} is valid (control port {}, {} environments)",
                "\u{2713}".green(),
                filename,
                config.bridge.port,
                config.environments.len(),
            );
            Ok(())
        }
        Err(errors) => {
            print_diagnostics(errors);
            std::process::exit(1);
        }
    }
}

/// File name used as the miette source name.
pub(crate) fn display_name(config_path: &Path) -> String {
    config_path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| CONFIG_FILENAME.to_string())
}

pub(crate) fn print_diagnostics(errors: Vec<ConfigDiagnostic>) {
    for err in errors {
        let report: miette::Report = err.into();
        eprintln!("{:?}", report);
    }
}
