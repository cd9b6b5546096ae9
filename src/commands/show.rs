use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;
use reqwest::Client;

use super::control_url;

pub async fn run(config_file: Option<&Path>, url: Option<String>) -> Result<()> {
    let url = control_url(config_file, url)?;
    let resp = Client::new()
        .get(&url)
        .send()
        .await
        .with_context(|| format!("connecting to bridge at {}", url))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("bridge returned {}: {}", status, body);
    }

    let dictionary: BTreeMap<String, String> =
        resp.json().await.context("parsing bridge configuration")?;
    let width = dictionary.keys().map(String::len).max().unwrap_or(0);
    for (key, value) in &dictionary {
        println!("  {:<width$}  {}", key.bold(), value, width = width);
    }
    Ok(())
}
