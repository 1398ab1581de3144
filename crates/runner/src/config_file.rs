//! Stream-configuration file loading.
//!
//! The configuration is YAML. `${VAR}` references are substituted from the
//! environment before parsing so credentials stay out of the file; every
//! missing variable is reported in one pass. Sources and destinations are
//! declared once at the top level and shared by all streams.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use databridge_core::{
    DestConfig, ExtractTask, LoadTask, SourceConfig, StreamConfig, StreamPolicy,
};
use regex::Regex;
use serde::Deserialize;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// The stream-definition part of one stream entry; sources and
/// destinations come from the file's top level.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSpec {
    /// Extract tasks, in run order.
    pub extract: Vec<ExtractTask>,
    /// Registered transform name.
    pub transform: String,
    /// Load tasks, in run order.
    pub load: Vec<LoadTask>,
    /// Per-stage error policies.
    #[serde(default)]
    pub policy: StreamPolicy,
}

/// A full configuration file: shared endpoints plus named streams.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Declared sources, shared across streams.
    pub sources: BTreeMap<String, SourceConfig>,
    /// Declared destinations, shared across streams.
    pub destinations: BTreeMap<String, DestConfig>,
    /// Stream definitions, keyed by stream name.
    pub streams: BTreeMap<String, StreamSpec>,
}

impl BridgeConfig {
    /// Declared stream names, sorted.
    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    /// Assemble the full [`StreamConfig`] for one named stream.
    pub fn stream_config(&self, name: &str) -> Option<StreamConfig> {
        let spec = self.streams.get(name)?;
        Some(StreamConfig {
            sources: self.sources.clone(),
            destinations: self.destinations.clone(),
            extract: spec.extract.clone(),
            transform: spec.transform.clone(),
            load: spec.load.clone(),
            policy: spec.policy,
        })
    }
}

/// Substitute `${VAR}` references with environment variable values.
///
/// Fails listing every missing variable, not just the first.
pub fn substitute_env_vars(raw: &str) -> Result<String> {
    let mut substituted = raw.to_string();
    let mut missing = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(raw) {
        let name = &cap[1];
        match std::env::var(name) {
            Ok(value) => substituted = substituted.replace(&cap[0], &value),
            Err(_) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
            }
        }
    }

    if !missing.is_empty() {
        anyhow::bail!(
            "missing environment variable(s) in configuration: {}",
            missing.join(", ")
        );
    }
    Ok(substituted)
}

/// Parse a configuration string (after env substitution).
pub fn parse_str(raw: &str) -> Result<BridgeConfig> {
    let substituted = substitute_env_vars(raw)?;
    serde_yaml::from_str(&substituted).context("failed to parse stream configuration YAML")
}

/// Load and parse a configuration file.
pub fn load(path: &Path) -> Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file: {}", path.display()))?;
    parse_str(&raw)
}
