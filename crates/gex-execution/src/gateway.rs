//! Broker Gateway — the SINGLE choke-point for all broker operations.
//!
//! # Invariant (enforced at both compile-time and runtime)
//!
//! **Compile-time:** `OrderRouter` is `pub(crate)` and never re-exported.
//! External crates have no way to construct one; the only public API that
//! reaches a broker adapter is `BrokerGateway`. Likewise `BrokerInvokeToken`'s
//! inner field is `pub(crate)`, so a `BrokerAdapter` implementation can name
//! the type but cannot construct one itself — only `BrokerGateway` can.
//!
//! **Runtime:** every call evaluates three gate verdicts in order and
//! refuses with `GateRefusal` if any fails:
//!
//! 1. `IntegrityGate::is_armed`   — EmergencyController has not disarmed/halted
//! 2. `RiskGate::is_allowed`      — RiskSizer returned Approved/Reduced
//! 3. `ReconcileGate::is_clean`   — the most recent reconcile report is clean
//!
//! `submit` additionally takes an [`OutboxClaimToken`]: the broker-side order
//! id is always the claim's idempotency key, never a caller-supplied value,
//! so a dispatcher can't submit under an id that was never durably claimed.
//! `cancel`/`replace` instead take a [`BrokerOrderMap`] and resolve the
//! caller's internal id to the broker's id, refusing with [`UnknownOrder`]
//! if no such order was ever registered.

use crate::id_map::BrokerOrderMap;
use crate::order_router::{
    BrokerAdapter, BrokerCancelResponse, BrokerReplaceRequest, BrokerReplaceResponse,
    BrokerSubmitRequest, BrokerSubmitResponse, OrderRouter,
};

// ---------------------------------------------------------------------------
// Gate traits
// ---------------------------------------------------------------------------

/// Whether EmergencyController currently permits live dispatch.
pub trait IntegrityGate {
    fn is_armed(&self) -> bool;
}

/// Whether RiskSizer's most recent decision for this order allows dispatch.
pub trait RiskGate {
    fn is_allowed(&self) -> bool;
}

/// Whether the last reconcile pass was clean and fresh.
pub trait ReconcileGate {
    fn is_clean(&self) -> bool;
}

/// The reason a broker operation was refused at the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRefusal {
    IntegrityDisarmed,
    RiskBlocked,
    ReconcileNotClean,
}

impl std::fmt::Display for GateRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateRefusal::IntegrityDisarmed => {
                write!(f, "GATE_REFUSED: integrity disarmed or halted")
            }
            GateRefusal::RiskBlocked => write!(f, "GATE_REFUSED: risk engine did not allow"),
            GateRefusal::ReconcileNotClean => write!(f, "GATE_REFUSED: reconcile is not clean"),
        }
    }
}

impl std::error::Error for GateRefusal {}

/// A cancel/replace target that was never registered in the `BrokerOrderMap`
/// (never submitted by this system, or already deregistered).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOrder {
    pub internal_id: String,
}

impl std::fmt::Display for UnknownOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CANCEL_REPLACE_REFUSED: no broker order mapped for internal id {}",
            self.internal_id
        )
    }
}

impl std::error::Error for UnknownOrder {}

// ---------------------------------------------------------------------------
// BrokerInvokeToken
// ---------------------------------------------------------------------------

/// Proof that a `BrokerAdapter` call was dispatched by `BrokerGateway` after
/// its gate checks passed. The inner field is `pub(crate)`, so external
/// crates can name the type (to implement `BrokerAdapter`) but cannot
/// construct one — only `BrokerGateway::submit/cancel/replace` can.
#[derive(Debug)]
pub struct BrokerInvokeToken(pub(crate) ());

impl BrokerInvokeToken {
    fn new() -> Self {
        Self(())
    }

    /// Test-only escape hatch for adapter unit tests that call
    /// `BrokerAdapter` methods directly, bypassing the gateway.
    #[cfg(any(test, feature = "testkit"))]
    pub fn for_test() -> Self {
        Self(())
    }
}

// ---------------------------------------------------------------------------
// OutboxClaimToken
// ---------------------------------------------------------------------------

/// Proof that `idempotency_key` was durably claimed from the outbox before
/// submission was attempted. The private `_priv` field blocks struct-literal
/// construction outside this module; callers must go through
/// [`OutboxClaimToken::from_claimed_row`].
#[derive(Debug, Clone)]
pub struct OutboxClaimToken {
    _priv: (),
    pub outbox_id: i64,
    pub idempotency_key: String,
}

impl OutboxClaimToken {
    /// Construct a claim token from a row the caller has already claimed
    /// (e.g. via `gex-store`'s claim-and-lock query). This is the only
    /// legitimate way to obtain one.
    pub fn from_claimed_row(outbox_id: i64, idempotency_key: impl Into<String>) -> Self {
        Self {
            _priv: (),
            outbox_id,
            idempotency_key: idempotency_key.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// BrokerGateway
// ---------------------------------------------------------------------------

/// The SINGLE choke-point through which ALL broker operations must flow.
///
/// ```text
/// External code
///     │
///     └──► BrokerGateway::submit / cancel / replace
///                │
///                ├── enforce_gates (integrity + risk + reconcile)
///                │        └── GateRefusal  ◄── refused here if any fails
///                │
///                └── OrderRouter::route_*  ◄── only reached if all clear
///                         └── BrokerAdapter::*
/// ```
pub struct BrokerGateway<B: BrokerAdapter, I: IntegrityGate, R: RiskGate, C: ReconcileGate> {
    router: OrderRouter<B>,
    integrity: I,
    risk: R,
    reconcile: C,
}

impl<B: BrokerAdapter, I: IntegrityGate, R: RiskGate, C: ReconcileGate> BrokerGateway<B, I, R, C> {
    pub fn new(broker: B, integrity: I, risk: R, reconcile: C) -> Self {
        Self {
            router: OrderRouter::new(broker),
            integrity,
            risk,
            reconcile,
        }
    }

    /// Evaluate all three gate verdicts in order, returning the first
    /// refusal encountered.
    fn enforce_gates(&self) -> Result<(), GateRefusal> {
        if !self.integrity.is_armed() {
            return Err(GateRefusal::IntegrityDisarmed);
        }
        if !self.risk.is_allowed() {
            return Err(GateRefusal::RiskBlocked);
        }
        if !self.reconcile.is_clean() {
            return Err(GateRefusal::ReconcileNotClean);
        }
        Ok(())
    }

    /// Submit a new broker order. The broker always sees `claim`'s
    /// idempotency key as the order id, overriding `req.order_id`.
    pub fn submit(
        &self,
        claim: &OutboxClaimToken,
        mut req: BrokerSubmitRequest,
    ) -> Result<BrokerSubmitResponse, Box<dyn std::error::Error>> {
        self.enforce_gates()?;
        req.order_id = claim.idempotency_key.clone();
        let token = BrokerInvokeToken::new();
        self.router.route_submit(req, &token)
    }

    /// Cancel a broker order. `internal_id` is resolved to a broker id via
    /// `map`; an unregistered id is refused before the broker is ever called.
    pub fn cancel(
        &self,
        internal_id: &str,
        map: &BrokerOrderMap,
    ) -> Result<BrokerCancelResponse, Box<dyn std::error::Error>> {
        self.enforce_gates()?;
        let broker_id = map.broker_id(internal_id).ok_or_else(|| UnknownOrder {
            internal_id: internal_id.to_string(),
        })?;
        let token = BrokerInvokeToken::new();
        self.router.route_cancel(broker_id, &token)
    }

    /// Replace a broker order's quantity/price/time-in-force, resolving
    /// `internal_id` to a broker id via `map` exactly as `cancel` does.
    pub fn replace(
        &self,
        internal_id: &str,
        map: &BrokerOrderMap,
        quantity: i32,
        limit_price: Option<i64>,
        time_in_force: String,
    ) -> Result<BrokerReplaceResponse, Box<dyn std::error::Error>> {
        self.enforce_gates()?;
        let broker_id = map.broker_id(internal_id).ok_or_else(|| UnknownOrder {
            internal_id: internal_id.to_string(),
        })?;
        let req = BrokerReplaceRequest {
            broker_order_id: broker_id.to_string(),
            quantity,
            limit_price,
            time_in_force,
        };
        let token = BrokerInvokeToken::new();
        self.router.route_replace(req, &token)
    }
}

// ---------------------------------------------------------------------------
// Idempotency derivation
// ---------------------------------------------------------------------------

/// Derive the stable `client_order_id` for a given intent id. The gateway's
/// `submit` uses the outbox claim's key directly; this helper is for sites
/// (e.g. `gex-pipeline`) that need the same derivation before a claim exists.
pub fn intent_id_to_client_order_id(intent_id: &str) -> String {
    intent_id.to_string()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOkBroker;

    impl BrokerAdapter for AlwaysOkBroker {
        fn submit_order(
            &self,
            req: BrokerSubmitRequest,
            _token: &BrokerInvokeToken,
        ) -> Result<BrokerSubmitResponse, Box<dyn std::error::Error>> {
            Ok(BrokerSubmitResponse {
                broker_order_id: format!("b-{}", req.order_id),
                submitted_at: 1,
                status: "ok".to_string(),
            })
        }

        fn cancel_order(
            &self,
            broker_order_id: &str,
            _token: &BrokerInvokeToken,
        ) -> Result<BrokerCancelResponse, Box<dyn std::error::Error>> {
            Ok(BrokerCancelResponse {
                broker_order_id: broker_order_id.to_string(),
                cancelled_at: 1,
                status: "ok".to_string(),
            })
        }

        fn replace_order(
            &self,
            req: BrokerReplaceRequest,
            _token: &BrokerInvokeToken,
        ) -> Result<BrokerReplaceResponse, Box<dyn std::error::Error>> {
            Ok(BrokerReplaceResponse {
                broker_order_id: req.broker_order_id,
                replaced_at: 1,
                status: "ok".to_string(),
            })
        }
    }

    struct BoolGate(bool);
    impl IntegrityGate for BoolGate {
        fn is_armed(&self) -> bool {
            self.0
        }
    }
    impl RiskGate for BoolGate {
        fn is_allowed(&self) -> bool {
            self.0
        }
    }
    impl ReconcileGate for BoolGate {
        fn is_clean(&self) -> bool {
            self.0
        }
    }

    type TestGateway = BrokerGateway<AlwaysOkBroker, BoolGate, BoolGate, BoolGate>;

    fn gw(integrity: bool, risk: bool, reconcile: bool) -> TestGateway {
        BrokerGateway::new(
            AlwaysOkBroker,
            BoolGate(integrity),
            BoolGate(risk),
            BoolGate(reconcile),
        )
    }

    fn submit_req() -> BrokerSubmitRequest {
        BrokerSubmitRequest {
            order_id: "ord-1".to_string(),
            symbol: "AAPL".to_string(),
            quantity: 10,
            order_type: "market".to_string(),
            limit_price: None,
            time_in_force: "day".to_string(),
        }
    }

    fn claim() -> OutboxClaimToken {
        OutboxClaimToken::from_claimed_row(1, "ord-1")
    }

    fn registered_map() -> BrokerOrderMap {
        let mut m = BrokerOrderMap::new();
        m.register("ord-1", "b-ord-1");
        m
    }

    #[test]
    fn all_clear_submit_succeeds() {
        let res = gw(true, true, true).submit(&claim(), submit_req());
        assert!(res.is_ok());
    }

    #[test]
    fn integrity_disarmed_blocks_submit() {
        let err = gw(false, true, true).submit(&claim(), submit_req()).unwrap_err();
        assert_eq!(
            *err.downcast::<GateRefusal>().unwrap(),
            GateRefusal::IntegrityDisarmed
        );
    }

    #[test]
    fn risk_blocked_blocks_submit() {
        let err = gw(true, false, true).submit(&claim(), submit_req()).unwrap_err();
        assert_eq!(*err.downcast::<GateRefusal>().unwrap(), GateRefusal::RiskBlocked);
    }

    #[test]
    fn reconcile_not_clean_blocks_submit() {
        let err = gw(true, true, false).submit(&claim(), submit_req()).unwrap_err();
        assert_eq!(
            *err.downcast::<GateRefusal>().unwrap(),
            GateRefusal::ReconcileNotClean
        );
    }

    #[test]
    fn integrity_checked_before_risk_and_reconcile() {
        let err = gw(false, false, false)
            .submit(&claim(), submit_req())
            .unwrap_err();
        assert_eq!(
            *err.downcast::<GateRefusal>().unwrap(),
            GateRefusal::IntegrityDisarmed
        );
    }

    #[test]
    fn submit_uses_claim_key_not_req_order_id() {
        let claim = OutboxClaimToken::from_claimed_row(42, "outbox-key");
        let mut req = submit_req();
        req.order_id = "caller-key".to_string();
        let resp = gw(true, true, true).submit(&claim, req).unwrap();
        assert_eq!(resp.broker_order_id, "b-outbox-key");
    }

    #[test]
    fn all_clear_cancel_succeeds() {
        let res = gw(true, true, true).cancel("ord-1", &registered_map());
        assert!(res.is_ok());
    }

    #[test]
    fn cancel_unknown_order_refused() {
        let err = gw(true, true, true)
            .cancel("unknown", &BrokerOrderMap::new())
            .unwrap_err();
        let refused = err.downcast::<UnknownOrder>().expect("UnknownOrder");
        assert_eq!(refused.internal_id, "unknown");
    }

    #[test]
    fn gate_failure_precedes_map_lookup_on_cancel() {
        let err = gw(false, true, true)
            .cancel("ord-1", &BrokerOrderMap::new())
            .unwrap_err();
        assert_eq!(
            *err.downcast::<GateRefusal>().unwrap(),
            GateRefusal::IntegrityDisarmed
        );
    }

    #[test]
    fn all_clear_replace_succeeds() {
        let res = gw(true, true, true).replace("ord-1", &registered_map(), 20, None, "day".to_string());
        assert!(res.is_ok());
    }

    #[test]
    fn replace_unknown_order_refused() {
        let err = gw(true, true, true)
            .replace("unknown", &BrokerOrderMap::new(), 20, None, "day".to_string())
            .unwrap_err();
        err.downcast::<UnknownOrder>().expect("UnknownOrder");
    }
}
