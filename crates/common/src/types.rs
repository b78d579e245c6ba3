//! Universal types shared across the engine and every provider module.
//!
//! Provider modules convert their wire shapes into these types. The HTTP
//! layer and the state machine consume only these — never provider-specific
//! structs.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{VeilError, VeilResult};

// ═══════════════════════════════════════════════════════════════════════
//  ASSETS & NETWORKS
// ═══════════════════════════════════════════════════════════════════════

/// Asset symbol. The user-facing set is closed; XMR is the distinguished
/// internal asset that both legs pivot through and never carries a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Btc,
    Eth,
    Usdt,
    Usdc,
    Ltc,
    Xmr,
}

impl Asset {
    /// Upper-case ticker, the canonical spelling across the API.
    pub fn ticker(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
            Asset::Usdt => "USDT",
            Asset::Usdc => "USDC",
            Asset::Ltc => "LTC",
            Asset::Xmr => "XMR",
        }
    }

    /// Native coins carry their own chain; tokens live on a host chain.
    pub fn is_token(&self) -> bool {
        matches!(self, Asset::Usdt | Asset::Usdc)
    }

    /// The native network implied by a coin symbol, if any.
    pub fn native_network(&self) -> Option<Network> {
        match self {
            Asset::Btc => Some(Network::Btc),
            Asset::Eth => Some(Network::Eth),
            Asset::Ltc => Some(Network::Ltc),
            _ => None,
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ticker())
    }
}

impl FromStr for Asset {
    type Err = VeilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" => Ok(Asset::Btc),
            "ETH" => Ok(Asset::Eth),
            "USDT" => Ok(Asset::Usdt),
            "USDC" => Ok(Asset::Usdc),
            "LTC" => Ok(Asset::Ltc),
            "XMR" => Ok(Asset::Xmr),
            other => Err(VeilError::Validation(format!("unsupported asset: {other}"))),
        }
    }
}

/// Network tag. Providers each spell these differently; adapters own the
/// translation (erc20/trc20/bep20, "mainnet", upper-case, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Network {
    Btc,
    Eth,
    Trx,
    Bsc,
    Ltc,
}

impl Network {
    pub fn tag(&self) -> &'static str {
        match self {
            Network::Btc => "BTC",
            Network::Eth => "ETH",
            Network::Trx => "TRX",
            Network::Bsc => "BSC",
            Network::Ltc => "LTC",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Network {
    type Err = VeilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" => Ok(Network::Btc),
            "ETH" | "ERC20" => Ok(Network::Eth),
            "TRX" | "TRC20" => Ok(Network::Trx),
            "BSC" | "BEP20" => Ok(Network::Bsc),
            "LTC" => Ok(Network::Ltc),
            other => Err(VeilError::Validation(format!(
                "unsupported network: {other}"
            ))),
        }
    }
}

/// Validate an (asset, network) combination as supplied on quote/start.
///
/// XMR never carries a network. Native coins accept their own chain or an
/// omitted one. Tokens must name a host chain out of {ETH, TRX, BSC}.
pub fn validate_pair(asset: Asset, network: Option<Network>) -> VeilResult<()> {
    match (asset, network) {
        (Asset::Xmr, None) => Ok(()),
        (Asset::Xmr, Some(n)) => Err(VeilError::Validation(format!(
            "XMR does not take a network (got {n})"
        ))),
        (a, None) if !a.is_token() => Ok(()),
        (a, Some(n)) if !a.is_token() => {
            if a.native_network() == Some(n) {
                Ok(())
            } else {
                Err(VeilError::Validation(format!("{a} is not native to {n}")))
            }
        }
        (a, Some(Network::Eth | Network::Trx | Network::Bsc)) if a.is_token() => Ok(()),
        (a, Some(n)) => Err(VeilError::Validation(format!("{a} is not issued on {n}"))),
        (a, None) => Err(VeilError::Validation(format!(
            "{a} requires a network out of ETH, TRX, BSC"
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  PROVIDERS & RATES
// ═══════════════════════════════════════════════════════════════════════

/// Swap provider identifier — which external exchange a leg runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    ChangeNow,
    Exolix,
    SimpleSwap,
    StealthEx,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::ChangeNow,
        ProviderId::Exolix,
        ProviderId::SimpleSwap,
        ProviderId::StealthEx,
    ];
}

impl Default for ProviderId {
    fn default() -> Self {
        ProviderId::ChangeNow
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderId::ChangeNow => write!(f, "changenow"),
            ProviderId::Exolix => write!(f, "exolix"),
            ProviderId::SimpleSwap => write!(f, "simpleswap"),
            ProviderId::StealthEx => write!(f, "stealthex"),
        }
    }
}

impl FromStr for ProviderId {
    type Err = VeilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "changenow" => Ok(ProviderId::ChangeNow),
            "exolix" => Ok(ProviderId::Exolix),
            "simpleswap" => Ok(ProviderId::SimpleSwap),
            "stealthex" => Ok(ProviderId::StealthEx),
            other => Err(VeilError::Validation(format!("unknown provider: {other}"))),
        }
    }
}

/// Quote flavor. Floating quotes drift; fixed quotes may be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
    #[default]
    Float,
    Fixed,
}

impl std::fmt::Display for RateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateType::Float => write!(f, "float"),
            RateType::Fixed => write!(f, "fixed"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  QUOTES & ROUTES
// ═══════════════════════════════════════════════════════════════════════

/// What the user wants converted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub in_asset: Asset,
    #[serde(default)]
    pub in_network: Option<Network>,
    pub out_asset: Asset,
    #[serde(default)]
    pub out_network: Option<Network>,
    pub amount: Decimal,
    #[serde(default)]
    pub rate_type: RateType,
}

impl QuoteRequest {
    pub fn validate(&self) -> VeilResult<()> {
        if self.amount <= Decimal::ZERO {
            return Err(VeilError::Validation("amount must be positive".into()));
        }
        if self.in_asset == Asset::Xmr || self.out_asset == Asset::Xmr {
            return Err(VeilError::Validation(
                "XMR is the internal pivot asset, not a swap side".into(),
            ));
        }
        validate_pair(self.in_asset, self.in_network)?;
        validate_pair(self.out_asset, self.out_network)?;
        Ok(())
    }
}

/// One priced leg of a candidate route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegQuote {
    pub provider: ProviderId,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
}

/// Fee breakdown attached to every route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// Theoretical mid-market XMR minus what leg-1 actually quotes.
    pub provider_spread_xmr: Decimal,
    /// Our fee, mirrored off the spread and capped.
    pub service_fee_xmr: Decimal,
    /// Opaque policy tag, e.g. `mirror_provider_spread_capped`.
    pub policy: String,
}

/// A fully priced leg1 × leg2 combination. Invariant: the two legs never
/// run on the same provider, so no single exchange sees both halves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOption {
    pub leg1: LegQuote,
    pub leg2: LegQuote,
    pub fees: FeeBreakdown,
    /// Estimated amount the user receives in the output asset.
    pub receive_out: Decimal,
}

// ═══════════════════════════════════════════════════════════════════════
//  SWAPS
// ═══════════════════════════════════════════════════════════════════════

/// Request body for starting a swap off a quoted route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSwapRequest {
    #[serde(flatten)]
    pub quote: QuoteRequest,
    pub leg1_provider: ProviderId,
    /// Auto-picked (first provider ≠ leg1) when omitted; must differ when given.
    #[serde(default)]
    pub leg2_provider: Option<ProviderId>,
    /// Where the user receives the output asset.
    pub payout_address: String,
    /// Leg-1 refund destination supplied by the user, if any.
    #[serde(default)]
    pub refund_address_user: Option<String>,
}

impl StartSwapRequest {
    pub fn validate(&self) -> VeilResult<()> {
        self.quote.validate()?;
        if self.payout_address.trim().is_empty() {
            return Err(VeilError::Validation("payout_address is required".into()));
        }
        if self.leg2_provider == Some(self.leg1_provider) {
            return Err(VeilError::Validation(
                "leg1_provider and leg2_provider must differ".into(),
            ));
        }
        Ok(())
    }
}

/// A wallet subaddress dedicated to exactly one swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAddress {
    pub address: String,
    pub index: u32,
}

/// Leg-1 record: the order converting the user's input into XMR paid to us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg1State {
    pub provider: ProviderId,
    pub order_id: String,
    /// Deposit address the user must pay — shown verbatim in /start.
    pub deposit_address: String,
    #[serde(default)]
    pub deposit_extra: Option<String>,
    /// Last raw provider info payload, kept for diagnostics only.
    #[serde(default)]
    pub last_info: Option<serde_json::Value>,
    #[serde(default)]
    pub status: String,
}

/// Leg-2 record: the order converting our XMR into the user's output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Leg2State {
    pub provider: ProviderId,
    /// In-flight guard: a sweep is currently creating the order.
    #[serde(default)]
    pub creating: bool,
    /// The order exists and the forward transfer was issued. Single source
    /// of truth for "never send twice".
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub last_info: Option<serde_json::Value>,
    #[serde(default)]
    pub status: String,
}

/// The central entity. Created at /start, mutated only by the state machine
/// under the registry lock, never deleted (terminal swaps are audit data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swap {
    /// Opaque 128-bit id (UUIDv4, hyphen-less).
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub request: StartSwapRequest,
    /// Fee locked in at quote time, in XMR.
    pub our_fee_xmr: Decimal,
    /// Provider spread observed when the fee was locked in, if any.
    #[serde(default)]
    pub quoted_spread_xmr: Option<Decimal>,
    /// Gross XMR seen on the subaddress at the last sweep.
    #[serde(default)]
    pub received_xmr: Decimal,
    pub subaddress: SubAddress,
    pub leg1: Leg1State,
    pub leg2: Leg2State,
    /// Wallet-side txid of the transfer that funded leg-2.
    #[serde(default)]
    pub last_sent_txid: Option<String>,
    /// Ordered state tokens; consecutive duplicates are compacted on save.
    #[serde(default)]
    pub timeline: Vec<String>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub refunded: bool,
    /// Short machine-readable status / diagnostic string.
    pub status: String,
}

impl Swap {
    /// Terminal swaps are sticky: the sweeper skips them and later provider
    /// observations never revive them.
    pub fn is_terminal(&self) -> bool {
        self.expired
            || self.refunded
            || matches!(self.status.as_str(), status::COMPLETE | status::FAILED)
    }

    /// Append a timeline token, skipping a repeat of the current tail.
    pub fn push_timeline(&mut self, token: &str) {
        if self.timeline.last().map(String::as_str) != Some(token) {
            self.timeline.push(token.to_string());
        }
    }

    /// Drop consecutive duplicate timeline tokens (run on every save).
    pub fn compact_timeline(&mut self) {
        self.timeline.dedup();
    }

    /// Admin status bucket, most severe condition first.
    pub fn bucket(&self) -> SwapBucket {
        if self.expired {
            SwapBucket::Expired
        } else if self.refunded {
            SwapBucket::Refunded
        } else if self.status == status::FAILED
            || self.status.contains("error")
            || self.leg2.status.contains("error")
        {
            SwapBucket::Failed
        } else if is_finished_status(&self.leg2.status) || self.status == status::COMPLETE {
            SwapBucket::Finished
        } else {
            SwapBucket::Active
        }
    }
}

/// Coarse admin-facing lifecycle bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapBucket {
    Expired,
    Refunded,
    Failed,
    Finished,
    Active,
}

impl std::fmt::Display for SwapBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapBucket::Expired => write!(f, "expired"),
            SwapBucket::Refunded => write!(f, "refunded"),
            SwapBucket::Failed => write!(f, "failed"),
            SwapBucket::Finished => write!(f, "finished"),
            SwapBucket::Active => write!(f, "active"),
        }
    }
}

/// Does a provider status string mean the order settled?
pub fn is_finished_status(status_text: &str) -> bool {
    matches!(status_text, "finished" | "completed" | "done")
}

/// Well-known swap status tokens. Diagnostic statuses (e.g.
/// `leg2_create_error:<reason>`) are free-form strings built on top.
pub mod status {
    pub const WAITING_DEPOSIT: &str = "waiting_deposit";
    pub const AWAITING_WALLET_UNLOCK: &str = "awaiting_wallet_unlock";
    pub const LEG2_ROUTING: &str = "leg2_routing";
    pub const COMPLETE: &str = "complete";
    pub const FAILED: &str = "failed";
    pub const EXPIRED: &str = "expired";
    pub const REFUNDED: &str = "refunded";
    /// Timeline token recorded when the forward transfer goes out.
    pub const ROUTING_XMR_TO_LEG2: &str = "routing_xmr_to_leg2";
    pub const LEG2_CREATE_ERROR: &str = "leg2_create_error";
}

// ═══════════════════════════════════════════════════════════════════════
//  PRICES
// ═══════════════════════════════════════════════════════════════════════

/// Mid-market USD prices. Advisory only: feeds the provider-spread
/// heuristic, never settles real amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    pub usd: HashMap<Asset, Decimal>,
}

impl PriceTable {
    /// Hard-coded defaults used whenever the oracle cannot answer.
    pub fn fallback() -> Self {
        let usd = HashMap::from([
            (Asset::Btc, Decimal::from(60_000)),
            (Asset::Eth, Decimal::from(3_000)),
            (Asset::Usdt, Decimal::ONE),
            (Asset::Usdc, Decimal::ONE),
            (Asset::Ltc, Decimal::from(70)),
            (Asset::Xmr, Decimal::from(160)),
        ]);
        Self { usd }
    }

    pub fn usd(&self, asset: Asset) -> Decimal {
        self.usd.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote_req(in_asset: Asset, in_net: Option<Network>, amount: Decimal) -> QuoteRequest {
        QuoteRequest {
            in_asset,
            in_network: in_net,
            out_asset: Asset::Ltc,
            out_network: Some(Network::Ltc),
            amount,
            rate_type: RateType::Float,
        }
    }

    #[test]
    fn test_native_pairs_validate() {
        assert!(validate_pair(Asset::Btc, Some(Network::Btc)).is_ok());
        assert!(validate_pair(Asset::Btc, None).is_ok());
        assert!(validate_pair(Asset::Ltc, Some(Network::Ltc)).is_ok());
        assert!(validate_pair(Asset::Btc, Some(Network::Eth)).is_err());
    }

    #[test]
    fn test_token_pairs_validate() {
        assert!(validate_pair(Asset::Usdt, Some(Network::Eth)).is_ok());
        assert!(validate_pair(Asset::Usdt, Some(Network::Trx)).is_ok());
        assert!(validate_pair(Asset::Usdc, Some(Network::Bsc)).is_ok());
        assert!(validate_pair(Asset::Usdt, Some(Network::Btc)).is_err());
        assert!(validate_pair(Asset::Usdt, None).is_err());
    }

    #[test]
    fn test_xmr_never_carries_network() {
        assert!(validate_pair(Asset::Xmr, None).is_ok());
        assert!(validate_pair(Asset::Xmr, Some(Network::Eth)).is_err());
    }

    #[test]
    fn test_quote_request_rejects_nonpositive_amount() {
        assert!(quote_req(Asset::Btc, Some(Network::Btc), dec!(0)).validate().is_err());
        assert!(quote_req(Asset::Btc, Some(Network::Btc), dec!(-1)).validate().is_err());
        assert!(quote_req(Asset::Btc, Some(Network::Btc), dec!(0.01)).validate().is_ok());
    }

    #[test]
    fn test_quote_request_rejects_xmr_sides() {
        let mut req = quote_req(Asset::Btc, Some(Network::Btc), dec!(1));
        req.out_asset = Asset::Xmr;
        req.out_network = None;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_start_request_rejects_same_provider() {
        let req = StartSwapRequest {
            quote: quote_req(Asset::Btc, Some(Network::Btc), dec!(0.01)),
            leg1_provider: ProviderId::Exolix,
            leg2_provider: Some(ProviderId::Exolix),
            payout_address: "ltc1qexample".into(),
            refund_address_user: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_provider_roundtrip() {
        for p in ProviderId::ALL {
            assert_eq!(p.to_string().parse::<ProviderId>().unwrap(), p);
        }
    }

    #[test]
    fn test_timeline_compaction() {
        let mut swap = sample_swap();
        swap.push_timeline("waiting_deposit");
        swap.push_timeline("waiting_deposit");
        swap.push_timeline("routing_xmr_to_leg2");
        swap.push_timeline("routing_xmr_to_leg2");
        assert_eq!(swap.timeline, vec!["waiting_deposit", "routing_xmr_to_leg2"]);

        swap.timeline = vec!["a".into(), "a".into(), "b".into(), "b".into(), "a".into()];
        swap.compact_timeline();
        assert_eq!(swap.timeline, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_bucket_precedence() {
        let mut swap = sample_swap();
        assert_eq!(swap.bucket(), SwapBucket::Active);

        swap.leg2.status = "finished".into();
        assert_eq!(swap.bucket(), SwapBucket::Finished);

        // The engine writes the diagnostic to the swap status; a provider
        // error surfaced via leg2 info must bucket as failed too.
        swap.status = "leg2_create_error:empty_deposit".into();
        assert_eq!(swap.bucket(), SwapBucket::Failed);
        swap.status = status::WAITING_DEPOSIT.into();
        swap.leg2.status = "error".into();
        assert_eq!(swap.bucket(), SwapBucket::Failed);

        swap.refunded = true;
        assert_eq!(swap.bucket(), SwapBucket::Refunded);

        swap.expired = true;
        assert_eq!(swap.bucket(), SwapBucket::Expired);
    }

    fn sample_swap() -> Swap {
        Swap {
            id: "a2f5b1c09e874d61b4f2a6c8d0e31f57".into(),
            created_at: Utc::now(),
            request: StartSwapRequest {
                quote: quote_req(Asset::Btc, Some(Network::Btc), dec!(0.01)),
                leg1_provider: ProviderId::ChangeNow,
                leg2_provider: Some(ProviderId::Exolix),
                payout_address: "ltc1qexample".into(),
                refund_address_user: None,
            },
            our_fee_xmr: dec!(0.002),
            quoted_spread_xmr: None,
            received_xmr: Decimal::ZERO,
            subaddress: SubAddress {
                address: "86subaddr".into(),
                index: 1,
            },
            leg1: Leg1State {
                provider: ProviderId::ChangeNow,
                order_id: "cn-1".into(),
                deposit_address: "bc1qdeposit".into(),
                deposit_extra: None,
                last_info: None,
                status: String::new(),
            },
            leg2: Leg2State {
                provider: ProviderId::Exolix,
                ..Default::default()
            },
            last_sent_txid: None,
            timeline: vec![],
            expired: false,
            refunded: false,
            status: status::WAITING_DEPOSIT.into(),
        }
    }
}
