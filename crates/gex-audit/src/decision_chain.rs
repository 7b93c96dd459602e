//! Decision-chain construction and verification (spec §4.6 Provenance).
//!
//! A `DecisionNode`'s `hash` covers `type ∥ parent_hash ∥ canonical(input) ∥
//! canonical(output) ∥ timestamp_ns`, so the chain is self-verifying from
//! stored input/output alone — no separate Merkle structure is needed.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use gex_schemas::{ChainOutcome, DecisionChainSummary, DecisionNode};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const SCHEMA_VERSION: u16 = 1;

fn canonical_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonical_value(&map[&k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonical_value).collect()),
        _ => v.clone(),
    }
}

fn canonical_string(v: &Value) -> String {
    serde_json::to_string(&canonical_value(v)).expect("Value serialization cannot fail")
}

/// `H(type ∥ parent_hash ∥ input ∥ output ∥ timestamp)`.
pub fn hash_decision_node(
    node_type: &str,
    parent_hash: Option<&str>,
    input: &Value,
    output: &Value,
    timestamp_ns: i64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(node_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(parent_hash.unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_string(input).as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_string(output).as_bytes());
    hasher.update(b"\0");
    hasher.update(timestamp_ns.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Appends `DecisionNode`s for a single chain, maintaining the running
/// parent-hash pointer so every node's `input` embeds the prior node's hash
/// (Testable Property 7: the chain verifies from stored data alone).
pub struct DecisionChainWriter {
    path: PathBuf,
    chain_id: Uuid,
    profile_id: String,
    signal_id: String,
    last_node_id: Option<Uuid>,
    last_hash: Option<String>,
    node_count: u32,
}

impl DecisionChainWriter {
    pub fn new(
        path: impl AsRef<Path>,
        chain_id: Uuid,
        profile_id: impl Into<String>,
        signal_id: impl Into<String>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        Ok(Self {
            path,
            chain_id,
            profile_id: profile_id.into(),
            signal_id: signal_id.into(),
            last_node_id: None,
            last_hash: None,
            node_count: 0,
        })
    }

    pub fn chain_id(&self) -> Uuid {
        self.chain_id
    }

    /// Append one node. `input` should already include whatever upstream
    /// context the node type needs (e.g. the admitted signal); this method
    /// stamps in `parent_id`/`parent_hash` and recomputes `hash`.
    pub fn append(
        &mut self,
        node_type: &str,
        source: &str,
        input: Value,
        output: Value,
        rationale: impl Into<String>,
        confidence: Option<f64>,
        timestamp_ns: i64,
    ) -> Result<DecisionNode> {
        let mut input = input;
        if let Some(parent_hash) = &self.last_hash {
            if let Value::Object(map) = &mut input {
                map.insert("parent_hash".to_string(), Value::String(parent_hash.clone()));
            }
        }

        let hash = hash_decision_node(
            node_type,
            self.last_hash.as_deref(),
            &input,
            &output,
            timestamp_ns,
        );

        let node = DecisionNode {
            id: Uuid::new_v4(),
            chain_id: self.chain_id,
            parent_id: self.last_node_id,
            node_type: node_type.to_string(),
            source: source.to_string(),
            timestamp_ns,
            input,
            output,
            rationale: rationale.into(),
            confidence,
            hash: hash.clone(),
            schema_version: SCHEMA_VERSION,
        };

        let line = serde_json::to_string(&node).context("serialize decision node")?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open decision chain log {:?}", self.path))?;
        f.write_all(line.as_bytes()).context("write decision node line")?;
        f.write_all(b"\n").context("write newline")?;

        self.last_node_id = Some(node.id);
        self.last_hash = Some(hash);
        self.node_count += 1;

        Ok(node)
    }

    /// Seal the chain with a terminal outcome. Does not append a node by
    /// itself — callers append the terminal node (e.g. `position.opened`,
    /// `signal.rejected`) first, then seal with the matching outcome.
    pub fn summary(&self, outcome: ChainOutcome, duration_ns: i64) -> DecisionChainSummary {
        DecisionChainSummary {
            chain_id: self.chain_id,
            profile_id: self.profile_id.clone(),
            signal_id: self.signal_id.clone(),
            outcome,
            sealed_at: Some(Utc::now()),
            duration_ns: Some(duration_ns),
        }
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }
}

/// Verify that every node in a decision-chain JSONL file hashes correctly
/// and that parent pointers form a single unbroken chain.
pub fn verify_decision_chain(path: impl AsRef<Path>) -> Result<ChainVerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read decision chain log {:?}", path.as_ref()))?;
    verify_decision_chain_str(&content)
}

pub fn verify_decision_chain_str(content: &str) -> Result<ChainVerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut prev_id: Option<Uuid> = None;
    let mut count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let node: DecisionNode =
            serde_json::from_str(trimmed).with_context(|| format!("parse node at line {}", i + 1))?;

        if node.parent_id != prev_id {
            return Ok(ChainVerifyResult::Broken {
                line: i + 1,
                reason: "parent_id does not match previous node".to_string(),
            });
        }

        let recomputed = hash_decision_node(
            &node.node_type,
            prev_hash.as_deref(),
            &node.input,
            &node.output,
            node.timestamp_ns,
        );
        if recomputed != node.hash {
            return Ok(ChainVerifyResult::Broken {
                line: i + 1,
                reason: format!("hash mismatch: stored {}, recomputed {}", node.hash, recomputed),
            });
        }

        prev_hash = Some(node.hash.clone());
        prev_id = Some(node.id);
        count += 1;
    }

    Ok(ChainVerifyResult::Valid { nodes: count })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerifyResult {
    Valid { nodes: usize },
    Broken { line: usize, reason: String },
}

/// Query filter for `export_bundle` (spec §4.6: "query" responsibility).
#[derive(Clone, Debug, Default)]
pub struct ExportFilter {
    pub chain_id: Option<Uuid>,
    pub profile_id: Option<String>,
    pub node_type: Option<String>,
}

impl ExportFilter {
    fn matches(&self, node: &DecisionNode) -> bool {
        if let Some(chain_id) = self.chain_id {
            if node.chain_id != chain_id {
                return false;
            }
        }
        if let Some(node_type) = &self.node_type {
            if &node.node_type != node_type {
                return false;
            }
        }
        true
    }
}

/// Read a decision-chain JSONL file and return the nodes matching `filter`,
/// in file order. Profile filtering relies on the caller routing a
/// per-profile log path; `filter.profile_id` is accepted for forward
/// compatibility with a combined multi-profile log.
pub fn export_bundle(path: impl AsRef<Path>, filter: &ExportFilter) -> Result<Vec<DecisionNode>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read decision chain log {:?}", path.as_ref()))?;
    let mut out = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let node: DecisionNode = serde_json::from_str(trimmed).context("parse decision node")?;
        if filter.matches(&node) {
            out.push(node);
        }
    }
    Ok(out)
}
