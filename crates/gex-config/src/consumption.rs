//! Governance over which config pointers a run mode is expected to read.
//! Catches config drift early: a key nobody consumes is either dead weight
//! or a typo for a key that should have taken effect.

use crate::ConfigError;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    Paper,
    Live,
}

pub fn consumed_pointers(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        ConfigMode::Paper => PAPER,
        ConfigMode::Live => LIVE,
    }
}

static PAPER: &[&str] = &[
    "/engine",
    "/risk",
    "/gate",
    "/broker",
    "/emergency",
];

static LIVE: &[&str] = &[
    "/engine",
    "/risk",
    "/gate",
    "/broker",
    "/emergency",
    "/reconcile",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct UnusedKeyReport {
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Walk every leaf of `config_json` and flag leaves not rooted under one of
/// `mode`'s consumed pointers. A leaf is consumed if its pointer is equal to,
/// or nested under, one of the registered roots — siblings are not.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport, ConfigError> {
    let roots = consumed_pointers(mode);
    let mut unused = Vec::new();
    collect_unused(config_json, "", roots, &mut unused);
    unused.sort();

    if policy == UnusedKeyPolicy::Fail && !unused.is_empty() {
        return Err(ConfigError::UnusedKeys(unused.len(), unused));
    }

    Ok(UnusedKeyReport {
        unused_leaf_pointers: unused,
    })
}

fn collect_unused(v: &Value, pointer: &str, roots: &[&str], out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                collect_unused(child, &format!("{pointer}/{k}"), roots, out);
            }
        }
        _ => {
            if !is_consumed(pointer, roots) {
                out.push(pointer.to_string());
            }
        }
    }
}

fn is_consumed(pointer: &str, roots: &[&str]) -> bool {
    roots
        .iter()
        .any(|root| pointer == *root || pointer.starts_with(&format!("{root}/")))
}
