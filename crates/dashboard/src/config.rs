//! Dashboard configuration: optional TOML file, then environment overrides,
//! then validation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::engine::DEFAULT_STALE_AFTER;
use crate::history::HISTORY_CAPACITY;

/// Poll cadence of the original dashboard.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

const MIN_POLL_INTERVAL_MS: u64 = 100;
const MAX_HISTORY_LEN: usize = 10_000;

// ---------------------------------------------------------------------------
// Config file structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub history_len: usize,
    pub stale_after_failures: u32,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: 5000,
            history_len: HISTORY_CAPACITY,
            stale_after_failures: DEFAULT_STALE_AFTER,
            username: None,
            password: None,
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Apply overrides from `(name, value)` pairs, normally `std::env::vars()`.
    /// Unknown names are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            match name.as_str() {
                "FARM_URL" => self.base_url = value,
                "FARM_USER" => self.username = Some(value),
                "FARM_PASSWORD" => self.password = Some(value),
                "POLL_INTERVAL_MS" => {
                    self.poll_interval_ms = value
                        .trim()
                        .parse()
                        .with_context(|| format!("POLL_INTERVAL_MS is not a number: {value:?}"))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate all fields. Reports every violation, not just the first.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        let url = self.base_url.trim();
        if url.is_empty() {
            errors.push("base_url is empty".to_string());
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!(
                "base_url '{url}' must start with http:// or https://"
            ));
        }

        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            errors.push(format!(
                "poll_interval_ms must be at least {MIN_POLL_INTERVAL_MS}, got {}",
                self.poll_interval_ms
            ));
        }
        if self.request_timeout_ms == 0 {
            errors.push("request_timeout_ms must be positive, got 0".to_string());
        }
        if !(1..=MAX_HISTORY_LEN).contains(&self.history_len) {
            errors.push(format!(
                "history_len {} out of range [1, {MAX_HISTORY_LEN}]",
                self.history_len
            ));
        }
        if self.stale_after_failures == 0 {
            errors.push("stale_after_failures must be positive, got 0".to_string());
        }

        match (&self.username, &self.password) {
            (Some(u), Some(_)) if u.trim().is_empty() => {
                errors.push("username is empty".to_string());
            }
            (Some(_), None) => errors.push("username set without password".to_string()),
            (None, Some(_)) => errors.push("password set without username".to_string()),
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read and parse a TOML config file. A missing file yields defaults.
pub fn load_file(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        tracing::info!(path, "no config file; using defaults");
        return Ok(Config::default());
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))
}

/// File, then environment, then validation.
pub fn load(path: &str) -> Result<Config> {
    let mut config = load_file(path)?;
    config.apply_env(std::env::vars())?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
