//! Runner configuration
//!
//! Layered as: built-in defaults, then an optional `smoke.toml`, then
//! `EQU_SMOKE_*` environment variables. The harness applies its CLI flags last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SmokeError, SmokeResult};
use crate::playwright::Browser;

pub const DEFAULT_BASE_URL: &str = "https://www.equ.ai";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    /// Site under test
    pub base_url: String,
    pub browser: Browser,
    pub headless: bool,
    /// Directory holding scenario YAML files
    pub scenarios_dir: PathBuf,
    /// Where screenshots are written
    pub artifacts_dir: PathBuf,
    pub baseline_dir: PathBuf,
    pub diff_dir: PathBuf,
    /// Where `smoke-results.json` is written
    pub output_dir: PathBuf,
    /// `node_modules` containing `@playwright/test`
    pub node_modules: PathBuf,
    /// Bound on waiting for an element to become interactable
    pub element_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub scenario_timeout_secs: u64,
    pub startup_timeout_secs: u64,
    /// Default visual diff threshold (percent)
    pub visual_threshold: f64,
    pub update_baselines: bool,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            browser: Browser::Chromium,
            headless: true,
            scenarios_dir: PathBuf::from("scenarios"),
            artifacts_dir: PathBuf::from("artifacts"),
            baseline_dir: PathBuf::from("baselines"),
            diff_dir: PathBuf::from("test-results/diffs"),
            output_dir: PathBuf::from("test-results"),
            node_modules: PathBuf::from("node_modules"),
            element_timeout_ms: 3000,
            navigation_timeout_ms: 30_000,
            scenario_timeout_secs: 120,
            startup_timeout_secs: 30,
            visual_threshold: 0.5,
            update_baselines: false,
        }
    }
}

impl SmokeConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml(content: &str) -> SmokeResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load defaults, the file at `path` if it exists, then the environment
    pub fn load(path: Option<&Path>) -> SmokeResult<Self> {
        let mut config = match path {
            Some(p) if p.exists() => Self::from_toml(&std::fs::read_to_string(p)?)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `EQU_SMOKE_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> SmokeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("EQU_SMOKE_BASE_URL") {
            self.base_url = url;
        }
        if let Some(browser) = lookup("EQU_SMOKE_BROWSER") {
            self.browser = browser.parse()?;
        }
        if let Some(headless) = lookup("EQU_SMOKE_HEADLESS") {
            self.headless = parse_bool("EQU_SMOKE_HEADLESS", &headless)?;
        }
        if let Some(dir) = lookup("EQU_SMOKE_ARTIFACTS_DIR") {
            self.artifacts_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_secs(self.scenario_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Resolve a scenario URL against the base URL
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }
}

fn parse_bool(key: &str, value: &str) -> SmokeResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(SmokeError::Config(format!("{}: expected a boolean, got '{}'", key, other))),
    }
}
