//! Runtime secret resolution. Config YAML stores only **env var NAMES**
//! (e.g. `"ALPACA_API_KEY_MAIN"`), never values. Callers resolve once at
//! startup via [`resolve_broker_credentials`] and pass the result into
//! constructors — never scatter `std::env::var` elsewhere.
//!
//! # Mode-aware enforcement
//! - `LIVE`:  api_key + api_secret are **required**.
//! - `PAPER`: both optional — the paper broker never dials out.
//!
//! `Debug` impls redact every field. Error messages name the env var, never
//! its value.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("SECRETS_MISSING mode={mode}: required env var '{var_name}' ({purpose}) is not set or empty")]
    Missing {
        mode: &'static str,
        var_name: String,
        purpose: &'static str,
    },
}

/// Broker credentials resolved from the environment for one profile.
#[derive(Clone)]
pub struct ResolvedBrokerCredentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl std::fmt::Debug for ResolvedBrokerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedBrokerCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve broker API credentials for `profile_id` for the given run mode.
/// `mode` is case-insensitive: `"LIVE"` or `"PAPER"`.
pub fn resolve_broker_credentials(
    config_json: &Value,
    profile_id: &str,
    mode: &str,
) -> Result<ResolvedBrokerCredentials, SecretsError> {
    let key_ptr = format!("/profiles/{profile_id}/broker/keys_env/api_key");
    let secret_ptr = format!("/profiles/{profile_id}/broker/keys_env/api_secret");

    let key_var =
        read_str_at(config_json, &key_ptr).unwrap_or_else(|| "GEX_BROKER_API_KEY".to_string());
    let secret_var = read_str_at(config_json, &secret_ptr)
        .unwrap_or_else(|| "GEX_BROKER_API_SECRET".to_string());

    let api_key = resolve_env(&key_var);
    let api_secret = resolve_env(&secret_var);

    let mode_upper = mode.trim().to_ascii_uppercase();
    if mode_upper == "LIVE" {
        if api_key.is_none() {
            return Err(SecretsError::Missing {
                mode: "LIVE",
                var_name: key_var,
                purpose: "broker api_key",
            });
        }
        if api_secret.is_none() {
            return Err(SecretsError::Missing {
                mode: "LIVE",
                var_name: secret_var,
                purpose: "broker api_secret",
            });
        }
    }

    Ok(ResolvedBrokerCredentials {
        api_key,
        api_secret,
    })
}
