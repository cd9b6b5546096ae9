use std::path::Path;

use anyhow::{bail, Context, Result};
use reqwest::Client;

use super::control_url;

pub async fn run(config_file: Option<&Path>, url: Option<String>) -> Result<()> {
    let url = control_url(config_file, url)?;
    let resp = Client::new()
        .delete(&url)
        .send()
        .await
        .with_context(|| format!("connecting to bridge at {}", url))?;

    let status = resp.status();
    let body = resp.text().await.context("reading bridge response")?;
    let message = plain_message(&body);

    if !status.is_success() {
        bail!("bridge returned {}: {}", status, message);
    }
    println!("{}", message);
    Ok(())
}

/// The bridge answers with JSON strings; show them without quotes.
fn plain_message(body: &str) -> String {
    serde_json::from_str::<String>(body).unwrap_or_else(|_| body.trim().to_string())
}
