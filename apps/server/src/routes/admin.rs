//! Admin listing — read-only view of every swap with computed metrics.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use veil_common::error::VeilError;
use veil_common::types::{Asset, Swap, SwapBucket};

use crate::routes::ApiError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/swaps", get(list_swaps))
        .route("/admin/swaps/:swap_id", get(get_swap))
}

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Deserialize)]
struct ListQuery {
    /// Bucket filter: expired | refunded | failed | finished | active.
    status: Option<String>,
    /// Substring match over ids and addresses.
    q: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

/// Money view of one swap for the admin UI.
#[derive(Debug, Serialize)]
struct SwapMetrics {
    gross_received_xmr: Decimal,
    our_fee_xmr: Decimal,
    our_fee_usd: Decimal,
    our_fee_pct: Decimal,
    net_forward_xmr: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider_spread_xmr: Option<Decimal>,
}

#[derive(Debug, Serialize)]
struct AdminSwap {
    bucket: SwapBucket,
    metrics: SwapMetrics,
    #[serde(flatten)]
    swap: Swap,
}

#[derive(Debug, Serialize)]
struct SwapListResponse {
    total: usize,
    page: usize,
    page_size: usize,
    swaps: Vec<AdminSwap>,
}

fn metrics_for(swap: &Swap, xmr_usd: Decimal, reserve: Decimal) -> SwapMetrics {
    let gross = swap.received_xmr;
    let fee = swap.our_fee_xmr;
    let fee_pct = if gross > Decimal::ZERO {
        (fee / gross * Decimal::from(100)).round_dp(4)
    } else {
        Decimal::ZERO
    };
    SwapMetrics {
        gross_received_xmr: gross,
        our_fee_xmr: fee,
        our_fee_usd: (fee * xmr_usd).round_dp(2),
        our_fee_pct: fee_pct,
        net_forward_xmr: (gross - fee - reserve).max(Decimal::ZERO),
        provider_spread_xmr: swap.quoted_spread_xmr,
    }
}

fn matches_query(swap: &Swap, q: &str) -> bool {
    let q = q.to_lowercase();
    let mut haystacks = vec![
        swap.id.as_str(),
        swap.leg1.order_id.as_str(),
        swap.leg1.deposit_address.as_str(),
        swap.subaddress.address.as_str(),
        swap.request.payout_address.as_str(),
    ];
    if let Some(oid) = &swap.leg2.order_id {
        haystacks.push(oid.as_str());
    }
    haystacks.iter().any(|h| h.to_lowercase().contains(&q))
}

async fn list_swaps(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SwapListResponse>, ApiError> {
    let orch = &state.orchestrator;
    let mut swaps = orch.registry().all();

    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        swaps.retain(|s| s.bucket().to_string() == status.to_lowercase());
    }
    if let Some(q) = query.q.as_deref().filter(|s| !s.is_empty()) {
        swaps.retain(|s| matches_query(s, q));
    }
    swaps.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = swaps.len();
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let xmr_usd = orch.prices().usd_prices().await.usd(Asset::Xmr);
    let reserve = orch.settings().send_fee_reserve;

    let swaps = swaps
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(|swap| AdminSwap {
            bucket: swap.bucket(),
            metrics: metrics_for(&swap, xmr_usd, reserve),
            swap,
        })
        .collect();

    Ok(Json(SwapListResponse {
        total,
        page,
        page_size,
        swaps,
    }))
}

async fn get_swap(
    State(state): State<Arc<AppState>>,
    Path(swap_id): Path<String>,
) -> Result<Json<AdminSwap>, ApiError> {
    let orch = &state.orchestrator;
    let swap = orch
        .registry()
        .get(&swap_id)
        .ok_or(VeilError::UnknownSwap(swap_id))?;

    let xmr_usd = orch.prices().usd_prices().await.usd(Asset::Xmr);
    let reserve = orch.settings().send_fee_reserve;

    Ok(Json(AdminSwap {
        bucket: swap.bucket(),
        metrics: metrics_for(&swap, xmr_usd, reserve),
        swap,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use veil_common::types::{
        status, Leg1State, Leg2State, Network, ProviderId, QuoteRequest, RateType,
        StartSwapRequest, SubAddress,
    };

    fn sample_swap() -> Swap {
        Swap {
            id: "deadbeefcafe".into(),
            created_at: Utc::now(),
            request: StartSwapRequest {
                quote: QuoteRequest {
                    in_asset: Asset::Btc,
                    in_network: Some(Network::Btc),
                    out_asset: Asset::Ltc,
                    out_network: Some(Network::Ltc),
                    amount: dec!(0.01),
                    rate_type: RateType::Float,
                },
                leg1_provider: ProviderId::ChangeNow,
                leg2_provider: Some(ProviderId::Exolix),
                payout_address: "ltc1qPayout".into(),
                refund_address_user: None,
            },
            our_fee_xmr: dec!(0.05),
            quoted_spread_xmr: Some(dec!(0.05)),
            received_xmr: dec!(0.65),
            subaddress: SubAddress {
                address: "86subaddr".into(),
                index: 1,
            },
            leg1: Leg1State {
                provider: ProviderId::ChangeNow,
                order_id: "CN-42".into(),
                deposit_address: "bc1qdeposit".into(),
                deposit_extra: None,
                last_info: None,
                status: "finished".into(),
            },
            leg2: Leg2State {
                provider: ProviderId::Exolix,
                ..Default::default()
            },
            last_sent_txid: None,
            timeline: vec![status::WAITING_DEPOSIT.into()],
            expired: false,
            refunded: false,
            status: status::WAITING_DEPOSIT.into(),
        }
    }

    #[test]
    fn test_metrics_math() {
        let m = metrics_for(&sample_swap(), dec!(160), dec!(0.0003));
        assert_eq!(m.gross_received_xmr, dec!(0.65));
        assert_eq!(m.our_fee_usd, dec!(8.00));
        assert_eq!(m.net_forward_xmr, dec!(0.5997));
        assert_eq!(m.our_fee_pct, (dec!(0.05) / dec!(0.65) * dec!(100)).round_dp(4));
    }

    #[test]
    fn test_metrics_zero_gross() {
        let mut swap = sample_swap();
        swap.received_xmr = Decimal::ZERO;
        let m = metrics_for(&swap, dec!(160), dec!(0.0003));
        assert_eq!(m.our_fee_pct, Decimal::ZERO);
        assert_eq!(m.net_forward_xmr, Decimal::ZERO);
    }

    #[test]
    fn test_query_matches_ids_and_addresses() {
        let swap = sample_swap();
        assert!(matches_query(&swap, "deadbeef"));
        assert!(matches_query(&swap, "cn-42"));
        assert!(matches_query(&swap, "PAYOUT"));
        assert!(matches_query(&swap, "86sub"));
        assert!(!matches_query(&swap, "nomatch"));
    }
}
