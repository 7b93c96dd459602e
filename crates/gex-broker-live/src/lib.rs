//! Live HTTP broker adapter sketch.
//!
//! Not wired into any running pipeline — this is the reference skeleton for
//! what a real broker integration looks like against the
//! `gex_execution::BrokerAdapter` contract: a REST client with blocking
//! calls, credentials read from the environment, and broker-specific status
//! strings mapped onto the order-router's broker-agnostic response types.
//!
//! Each concrete broker integration (a specific vendor's REST API) is its
//! own implementation of this shape; this crate holds the shared client
//! plumbing and one illustrative `submit_order` path.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context};
use gex_execution::{
    BrokerAdapter, BrokerCancelResponse, BrokerInvokeToken, BrokerReplaceRequest,
    BrokerReplaceResponse, BrokerSubmitRequest, BrokerSubmitResponse,
};
use serde::Deserialize;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Credentials and endpoint for one broker account. Never logged, never
/// serialized back out — the gateway token proves the caller already passed
/// the gate checks that are allowed to know this exists.
#[derive(Clone)]
pub struct LiveBrokerConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl LiveBrokerConfig {
    /// Reads `GEX_BROKER_BASE_URL` / `GEX_BROKER_API_KEY` / `GEX_BROKER_API_SECRET`.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            base_url: std::env::var("GEX_BROKER_BASE_URL")
                .context("GEX_BROKER_BASE_URL not set")?,
            api_key: std::env::var("GEX_BROKER_API_KEY").context("GEX_BROKER_API_KEY not set")?,
            api_secret: std::env::var("GEX_BROKER_API_SECRET")
                .context("GEX_BROKER_API_SECRET not set")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BrokerOrderAck {
    id: String,
    status: String,
}

pub struct LiveBroker {
    client: reqwest::blocking::Client,
    config: LiveBrokerConfig,
}

impl LiveBroker {
    pub fn new(config: LiveBrokerConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("building live broker http client")?;
        Ok(Self { client, config })
    }

    fn now_unix() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// `reqwest::blocking` must not run its own drop inside a live Tokio
    /// reactor thread (Tokio 1.49 panics on that). Call sites reached from
    /// async code must route through `tokio::task::block_in_place`.
    fn blocking_call<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::task::block_in_place(f)
        } else {
            f()
        }
    }
}

impl BrokerAdapter for LiveBroker {
    fn submit_order(
        &self,
        req: BrokerSubmitRequest,
        _token: &BrokerInvokeToken,
    ) -> Result<BrokerSubmitResponse> {
        Self::blocking_call(|| {
            let url = format!("{}/v2/orders", self.config.base_url);
            let body = serde_json::json!({
                "client_order_id": req.order_id,
                "symbol": req.symbol,
                "qty": req.quantity.unsigned_abs(),
                "side": if req.quantity >= 0 { "buy" } else { "sell" },
                "type": req.order_type,
                "limit_price": req.limit_price,
                "time_in_force": req.time_in_force,
            });

            let resp = self
                .client
                .post(&url)
                .header("APCA-API-KEY-ID", &self.config.api_key)
                .header("APCA-API-SECRET-KEY", &self.config.api_secret)
                .json(&body)
                .send()
                .map_err(|e| anyhow!("broker submit request failed: {e}"))?;

            if !resp.status().is_success() {
                return Err(anyhow!("broker rejected submit: HTTP {}", resp.status()).into());
            }

            let ack: BrokerOrderAck = resp
                .json()
                .map_err(|e| anyhow!("broker submit response decode failed: {e}"))?;

            Ok(BrokerSubmitResponse {
                broker_order_id: ack.id,
                submitted_at: Self::now_unix(),
                status: ack.status,
            })
        })
    }

    fn cancel_order(
        &self,
        broker_order_id: &str,
        _token: &BrokerInvokeToken,
    ) -> Result<BrokerCancelResponse> {
        Self::blocking_call(|| {
            let url = format!("{}/v2/orders/{}", self.config.base_url, broker_order_id);

            let resp = self
                .client
                .delete(&url)
                .header("APCA-API-KEY-ID", &self.config.api_key)
                .header("APCA-API-SECRET-KEY", &self.config.api_secret)
                .send()
                .map_err(|e| anyhow!("broker cancel request failed: {e}"))?;

            if !resp.status().is_success() {
                return Err(anyhow!("broker rejected cancel: HTTP {}", resp.status()).into());
            }

            Ok(BrokerCancelResponse {
                broker_order_id: broker_order_id.to_string(),
                cancelled_at: Self::now_unix(),
                status: "canceled".to_string(),
            })
        })
    }

    fn replace_order(
        &self,
        req: BrokerReplaceRequest,
        _token: &BrokerInvokeToken,
    ) -> Result<BrokerReplaceResponse> {
        Self::blocking_call(|| {
            let url = format!(
                "{}/v2/orders/{}",
                self.config.base_url, req.broker_order_id
            );
            let body = serde_json::json!({
                "qty": req.quantity.unsigned_abs(),
                "limit_price": req.limit_price,
                "time_in_force": req.time_in_force,
            });

            let resp = self
                .client
                .patch(&url)
                .header("APCA-API-KEY-ID", &self.config.api_key)
                .header("APCA-API-SECRET-KEY", &self.config.api_secret)
                .json(&body)
                .send()
                .map_err(|e| anyhow!("broker replace request failed: {e}"))?;

            if !resp.status().is_success() {
                return Err(anyhow!("broker rejected replace: HTTP {}", resp.status()).into());
            }

            let ack: BrokerOrderAck = resp
                .json()
                .map_err(|e| anyhow!("broker replace response decode failed: {e}"))?;

            Ok(BrokerReplaceResponse {
                broker_order_id: ack.id,
                replaced_at: Self::now_unix(),
                status: ack.status,
            })
        })
    }
}
