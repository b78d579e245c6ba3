//! Contracts between the core engine and its collaborators.
//!
//! Every external swap provider implements [`SwapProvider`]; the Monero
//! wallet RPC client implements [`WalletOps`]; the price oracle implements
//! [`PriceFeed`]. The engine and quote machinery dispatch only through
//! these traits, which is also what makes the state machine testable with
//! in-memory fakes.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::VeilResult;
use crate::types::{Asset, Network, PriceTable, ProviderId, RateType, SubAddress};

// ═══════════════════════════════════════════════════════════════════════
//  PROVIDER CONTRACT
// ═══════════════════════════════════════════════════════════════════════

/// Inputs for a price estimate.
#[derive(Debug, Clone)]
pub struct EstimateRequest {
    pub from_asset: Asset,
    pub from_network: Option<Network>,
    pub to_asset: Asset,
    pub to_network: Option<Network>,
    pub amount: Decimal,
    pub rate_type: RateType,
}

/// Inputs for order creation.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub from_asset: Asset,
    pub from_network: Option<Network>,
    pub to_asset: Asset,
    pub to_network: Option<Network>,
    pub amount: Decimal,
    /// Where the provider pays the output.
    pub payout_address: String,
    pub rate_type: RateType,
    /// Where the provider returns the input on failure, if supported.
    pub refund_address: Option<String>,
}

/// Normalized estimate. `to_amount == 0` means "hide this route": pair
/// unsupported, below the provider minimum, or provider unreachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Estimate {
    pub to_amount: Decimal,
    /// Raw provider payload, diagnostics only.
    pub raw: serde_json::Value,
}

impl Estimate {
    pub fn zero() -> Self {
        Self {
            to_amount: Decimal::ZERO,
            raw: serde_json::Value::Null,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.to_amount > Decimal::ZERO
    }
}

/// Normalized order-creation result. Field names vary wildly between
/// providers (payinAddress / depositAddress / deposit / address_from);
/// adapters map them all here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub order_id: String,
    pub deposit_address: String,
    pub deposit_extra: Option<String>,
    pub raw: serde_json::Value,
}

/// Normalized order status. `status_text` is lower-cased; the state
/// machine interprets it against a small vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderInfo {
    pub status_text: String,
    pub raw: serde_json::Value,
}

/// Uniform interface over one external swap provider.
#[async_trait]
pub trait SwapProvider: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> ProviderId;

    /// Price a conversion. Infallible by contract: any failure collapses
    /// to a zero estimate so quote aggregation can simply skip the route.
    async fn estimate(&self, req: &EstimateRequest) -> Estimate;

    /// Create an order. Errors with `ProviderCreateFailed` on a non-2xx
    /// response or an empty deposit address.
    async fn create(&self, req: &CreateOrderRequest) -> VeilResult<CreatedOrder>;

    /// Fetch current order status.
    async fn info(&self, order_id: &str) -> VeilResult<OrderInfo>;
}

// ═══════════════════════════════════════════════════════════════════════
//  WALLET CONTRACT
// ═══════════════════════════════════════════════════════════════════════

/// The slice of Monero wallet RPC the engine consumes. Amounts are XMR
/// decimals at this boundary; the wire speaks integer piconero.
#[async_trait]
pub trait WalletOps: Send + Sync {
    /// Create a fresh subaddress under account 0, labeled per swap.
    async fn create_subaddress(&self, label: &str) -> VeilResult<SubAddress>;

    /// Sum of unique inbound amounts to the subaddress across confirmed,
    /// pending and mempool transfers, deduplicated by (txid, amount).
    /// Returns 0 on any RPC error.
    async fn sum_received(&self, subaddr_index: u32) -> Decimal;

    /// Account-wide unlocked balance. The wallet commingles unlocked
    /// funds, so this is a global budget, not per-subaddress.
    async fn unlocked_balance(&self) -> VeilResult<Decimal>;

    /// Send XMR. Errors with `WalletSend` on any RPC failure.
    async fn transfer(&self, dest_address: &str, amount_xmr: Decimal) -> VeilResult<String>;
}

// ═══════════════════════════════════════════════════════════════════════
//  PRICE CONTRACT
// ═══════════════════════════════════════════════════════════════════════

/// Mid-market USD price source. Must never block core progress: failures
/// degrade to the constant fallback table.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn usd_prices(&self) -> PriceTable;
}
