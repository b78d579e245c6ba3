//! XMR ↔ piconero conversion.
//!
//! All on-wire wallet amounts are integer atomic units (piconero); the
//! engine works in `Decimal` XMR. The factor is fixed at 10^12.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Atomic units per XMR.
pub const PICONERO_PER_XMR: u64 = 1_000_000_000_000;

/// Convert integer piconero into XMR. Exact: `Decimal` carries 12
/// fractional digits without rounding.
pub fn piconero_to_xmr(atomic: u64) -> Decimal {
    Decimal::from(atomic) / Decimal::from(PICONERO_PER_XMR)
}

/// Convert XMR into integer piconero, truncating anything beyond 12
/// decimal places. Negative inputs clamp to zero.
pub fn xmr_to_piconero(xmr: Decimal) -> u64 {
    if xmr <= Decimal::ZERO {
        return 0;
    }
    let atomic = (xmr * Decimal::from(PICONERO_PER_XMR)).trunc();
    atomic.to_u64().unwrap_or(u64::MAX)
}
