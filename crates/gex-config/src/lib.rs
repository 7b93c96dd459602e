//! Layered YAML configuration for the gateway: load, deep-merge, canonicalize,
//! hash, and deserialize into the typed records the rest of the workspace
//! consumes. No crate outside this one should touch `serde_yaml` directly.
//!
//! Money/rate fields in the typed records are plain `f64` fractions (0..1) —
//! they gate sizing and risk decisions, they are never summed into ledger
//! balances, so the fixed-point discipline in `gex-schemas` does not apply.

pub mod consumption;
pub mod secrets;

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse yaml {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("CONFIG_SECRET_DETECTED at {pointer}: literal secret values are not allowed in config; store the env var NAME under a `*_env` key instead")]
    SecretDetected { pointer: String },
    #[error("CONFIG_UNUSED_KEYS: {0} key(s) are present but never consumed in this mode: {1:?}")]
    UnusedKeys(usize, Vec<String>),
    #[error("deserialize typed config: {0}")]
    Deserialize(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Layered load + canonicalize + hash
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

impl LoadedConfig {
    /// Deserialize the merged config into a typed record. Call this once at
    /// startup and pass the result around; nothing downstream should touch
    /// `config_json` directly.
    pub fn parse<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.config_json.clone())?)
    }
}

/// Load + merge YAML files from disk, in order. Later files override earlier
/// ones via deep-merge. Rejects any layer containing a literal secret value.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut sources = Vec::with_capacity(paths.len());
    for p in paths {
        let s = fs::read_to_string(p).map_err(|source| ConfigError::Read {
            path: p.to_string(),
            source,
        })?;
        sources.push(s);
    }
    let borrowed: Vec<&str> = sources.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&borrowed)
}

/// Same as [`load_layered_yaml`] but takes YAML already in memory — the form
/// used by every test in this crate and by `gex-cli`'s `--config-str` flag.
pub fn load_layered_yaml_from_strings(sources: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for (i, s) in sources.iter().enumerate() {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(s).map_err(|source| ConfigError::Yaml {
                path: format!("<layer {i}>"),
                source,
            })?;
        let json_val = serde_json::to_value(yaml_val)?;
        deep_merge(&mut merged, json_val);
    }

    reject_literal_secrets(&merged, "")?;

    let canonical_value = sort_keys(&merged);
    let canonical_json = serde_json::to_string(&canonical_value)?;

    let mut hasher = Sha256::new();
    hasher.update(canonical_json.as_bytes());
    let config_hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: canonical_value,
        canonical_json,
        config_hash,
    })
}

fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Any key named `*_env` is exempt — its value is expected to be an env var
/// NAME, not a secret. Everything else is scanned for secret-shaped strings.
fn reject_literal_secrets(v: &Value, pointer: &str) -> Result<()> {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                let child_pointer = format!("{pointer}/{k}");
                if k.ends_with("_env") || k == "keys_env" {
                    continue;
                }
                reject_literal_secrets(child, &child_pointer)?;
            }
            Ok(())
        }
        Value::Array(arr) => {
            for (i, child) in arr.iter().enumerate() {
                reject_literal_secrets(child, &format!("{pointer}/{i}"))?;
            }
            Ok(())
        }
        Value::String(s) => {
            if looks_like_secret(s) {
                return Err(ConfigError::SecretDetected {
                    pointer: pointer.to_string(),
                });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn looks_like_secret(s: &str) -> bool {
    const PREFIXES: &[&str] = &["sk-", "AKIA", "-----BEGIN"];
    PREFIXES.iter().any(|p| s.starts_with(p))
}

// ---------------------------------------------------------------------------
// Typed configuration records (spec §9 tunables)
// ---------------------------------------------------------------------------

fn default_max_positions() -> u32 {
    2
}
fn default_max_risk_per_trade_fraction() -> f64 {
    0.01
}
fn default_max_total_risk_fraction() -> f64 {
    0.05
}
fn default_max_cvar_fraction() -> f64 {
    0.08
}
fn default_dd_reduce_threshold() -> f64 {
    0.10
}
fn default_dd_halt_threshold() -> f64 {
    0.15
}
fn default_kelly_scale() -> f64 {
    0.15
}
fn default_kelly_min_confidence() -> f64 {
    0.55
}
fn default_max_correlation() -> f64 {
    0.7
}
fn default_signal_rate_limit_per_minute() -> u32 {
    10
}
fn default_global_signal_rate_limit() -> u32 {
    300
}
fn default_signal_timeout_s() -> u64 {
    5
}
fn default_broker_heartbeat_s() -> u64 {
    10
}
fn default_broker_reconnect_max_attempts() -> u32 {
    5
}
fn default_emergency_flash_crash_pct() -> f64 {
    0.03
}
fn default_emergency_flash_crash_window_s() -> u64 {
    60
}
fn default_emergency_vol_multiplier() -> f64 {
    4.0
}
fn default_emergency_spread_multiplier() -> f64 {
    5.0
}

/// Sizing and portfolio-risk limits consumed by `gex-risk`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_positions: u32,
    pub max_risk_per_trade_fraction: f64,
    pub max_total_risk_fraction: f64,
    pub max_cvar_fraction: f64,
    pub dd_reduce_threshold: f64,
    pub dd_halt_threshold: f64,
    pub kelly_scale: f64,
    pub kelly_min_confidence: f64,
    pub max_correlation: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            max_positions: default_max_positions(),
            max_risk_per_trade_fraction: default_max_risk_per_trade_fraction(),
            max_total_risk_fraction: default_max_total_risk_fraction(),
            max_cvar_fraction: default_max_cvar_fraction(),
            dd_reduce_threshold: default_dd_reduce_threshold(),
            dd_halt_threshold: default_dd_halt_threshold(),
            kelly_scale: default_kelly_scale(),
            kelly_min_confidence: default_kelly_min_confidence(),
            max_correlation: default_max_correlation(),
        }
    }
}

/// Rate limiting and timeouts consumed by `gex-gate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub signal_rate_limit_per_minute: u32,
    pub global_signal_rate_limit: u32,
    pub signal_timeout_s: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            signal_rate_limit_per_minute: default_signal_rate_limit_per_minute(),
            global_signal_rate_limit: default_global_signal_rate_limit(),
            signal_timeout_s: default_signal_timeout_s(),
        }
    }
}

/// Connection and reconnect tuning consumed by `gex-broker`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerPoolConfig {
    pub broker_heartbeat_s: u64,
    pub broker_reconnect_max_attempts: u32,
}

impl Default for BrokerPoolConfig {
    fn default() -> Self {
        BrokerPoolConfig {
            broker_heartbeat_s: default_broker_heartbeat_s(),
            broker_reconnect_max_attempts: default_broker_reconnect_max_attempts(),
        }
    }
}

/// Trigger thresholds consumed by `gex-emergency`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    pub emergency_flash_crash_pct: f64,
    pub emergency_flash_crash_window_s: u64,
    pub emergency_vol_multiplier: f64,
    pub emergency_spread_multiplier: f64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        EmergencyConfig {
            emergency_flash_crash_pct: default_emergency_flash_crash_pct(),
            emergency_flash_crash_window_s: default_emergency_flash_crash_window_s(),
            emergency_vol_multiplier: default_emergency_vol_multiplier(),
            emergency_spread_multiplier: default_emergency_spread_multiplier(),
        }
    }
}

/// Top-level typed view of the merged config. This, not the raw `Value`, is
/// what every other crate in the workspace depends on.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub risk: RiskConfig,
    pub gate: GateConfig,
    pub broker: BrokerPoolConfig,
    pub emergency: EmergencyConfig,
}

impl GatewayConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        loaded.parse()
    }
}
