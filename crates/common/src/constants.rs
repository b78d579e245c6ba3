//! Universal constants for Veil.

use rust_decimal::Decimal;

/// Fee policy tag surfaced in every quote. The UI treats this as opaque so
/// alternate policies can ship without changing the RouteOption shape.
pub const FEE_POLICY_MIRROR_CAPPED: &str = "mirror_provider_spread_capped";

/// A swap with no payment after this long is expired by the sweeper.
pub const SWAP_EXPIRY_SECS: i64 = 2 * 60 * 60;

/// Ceiling on our fee as a fraction of the leg-1 XMR amount (0.15 = 15%).
pub fn default_fee_cap_ratio() -> Decimal {
    Decimal::new(15, 2)
}

/// XMR held back from every forward transfer to cover the miner fee.
pub fn default_send_fee_reserve() -> Decimal {
    // 0.00030 XMR
    Decimal::new(30, 5)
}

/// Haircut applied to mid-market StealthEX estimates (0.93 = keep 93%).
pub fn default_stealthex_haircut() -> Decimal {
    Decimal::new(93, 2)
}

/// Seconds between sweeper passes.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 8;
