pub mod config;
pub mod run;

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use triage_core::config::Config;

/// Loads the config file and applies the token override.
pub fn load_config(path: &Path, access_token: Option<String>) -> anyhow::Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    Ok(config.with_access_token(access_token))
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
