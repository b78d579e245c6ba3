//! The per-swap state machine.
//!
//! `advance` is idempotent and re-entrant: the sweeper and on-demand
//! status queries both call it, possibly concurrently for the same swap.
//! It follows a snapshot–mutate–commit discipline — the registry lock is
//! never held across provider or wallet I/O, and the leg-2 `creating`/
//! `created` flags are re-checked under the lock so order creation and the
//! forward transfer happen at most once per swap.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use veil_common::constants::SWAP_EXPIRY_SECS;
use veil_common::error::{VeilError, VeilResult};
use veil_common::traits::{CreateOrderRequest, EstimateRequest, OrderInfo};
use veil_common::types::{
    status, Asset, Leg1State, Leg2State, QuoteRequest, StartSwapRequest, Swap,
};

use crate::orchestrator::Orchestrator;
use crate::quote;

// ═══════════════════════════════════════════════════════════════════════
//  STATUS VOCABULARY
// ═══════════════════════════════════════════════════════════════════════

/// Provider said the deposit went back to the sender.
pub fn is_refund_status(s: &str) -> bool {
    ["refund", "returned", "sent back", "reimbursed"]
        .iter()
        .any(|w| s.contains(w))
}

/// Provider closed the order without payment.
pub fn is_hard_expired_status(s: &str) -> bool {
    ["expired", "cancel", "timeout", "timed out"]
        .iter()
        .any(|w| s.contains(w))
}

/// Order still waiting on the user; eligible for age-based expiry.
/// "unpaid" lives here, not in the hard set — a brand-new order reports
/// it and must not expire on its first sweep.
pub fn is_waiting_status(s: &str) -> bool {
    s.is_empty()
        || ["waiting", "unpaid", "no payment", "await", "new", "pending"]
            .iter()
            .any(|w| s.contains(w))
}

/// Provider reported a hard failure.
pub fn is_failed_status(s: &str) -> bool {
    s.contains("error") || s.contains("fail")
}

// ═══════════════════════════════════════════════════════════════════════
//  START
// ═══════════════════════════════════════════════════════════════════════

fn leg1_estimate_request(q: &QuoteRequest) -> EstimateRequest {
    EstimateRequest {
        from_asset: q.in_asset,
        from_network: q.in_network,
        to_asset: Asset::Xmr,
        to_network: None,
        amount: q.amount,
        rate_type: q.rate_type,
    }
}

/// Create a swap: dedicated subaddress, leg-1 order, initial persist.
///
/// Fails without persisting anything when the leg-1 provider rejects the
/// order or returns an empty deposit address.
pub async fn start(orch: &Orchestrator, req: StartSwapRequest) -> VeilResult<Swap> {
    req.validate()?;

    let leg1 = orch.provider(req.leg1_provider)?;
    let leg2_provider = match req.leg2_provider {
        Some(p) => {
            orch.provider(p)?;
            p
        }
        None => orch
            .provider_ids()
            .into_iter()
            .find(|p| *p != req.leg1_provider)
            .ok_or_else(|| VeilError::Validation("no second provider available".into()))?,
    };

    // Lock the fee in now, priced exactly the way /quote prices it.
    let estimate = leg1.estimate(&leg1_estimate_request(&req.quote)).await;
    let prices = orch.prices().usd_prices().await;
    let mid_xmr = quote::mid_market_xmr(&prices, req.quote.in_asset, req.quote.amount);
    let spread = quote::provider_spread(mid_xmr, estimate.to_amount);
    let our_fee_xmr = quote::capped_fee(spread, estimate.to_amount, orch.settings().fee_cap_ratio);
    if !estimate.is_usable() {
        warn!(provider = %req.leg1_provider, "leg1 estimate unavailable at start; fee set to zero");
    }

    let swap_id = Uuid::new_v4().simple().to_string();
    let subaddress = orch.wallet().create_subaddress(&swap_id).await?;

    let order = leg1
        .create(&CreateOrderRequest {
            from_asset: req.quote.in_asset,
            from_network: req.quote.in_network,
            to_asset: Asset::Xmr,
            to_network: None,
            amount: req.quote.amount,
            payout_address: subaddress.address.clone(),
            rate_type: req.quote.rate_type,
            refund_address: req.refund_address_user.clone(),
        })
        .await?;

    let mut swap = Swap {
        id: swap_id,
        created_at: Utc::now(),
        leg1: Leg1State {
            provider: req.leg1_provider,
            order_id: order.order_id.clone(),
            deposit_address: order.deposit_address.clone(),
            deposit_extra: order.deposit_extra.clone(),
            last_info: Some(order.raw),
            status: String::new(),
        },
        leg2: Leg2State {
            provider: leg2_provider,
            ..Default::default()
        },
        request: req,
        our_fee_xmr,
        quoted_spread_xmr: estimate.is_usable().then_some(spread),
        received_xmr: Decimal::ZERO,
        subaddress,
        last_sent_txid: None,
        timeline: Vec::new(),
        expired: false,
        refunded: false,
        status: status::WAITING_DEPOSIT.into(),
    };
    swap.push_timeline(status::WAITING_DEPOSIT);

    orch.registry().insert(swap.clone());
    info!(
        swap_id = %swap.id,
        leg1 = %swap.leg1.provider,
        leg2 = %swap.leg2.provider,
        order_id = %swap.leg1.order_id,
        "swap started"
    );

    Ok(swap)
}

// ═══════════════════════════════════════════════════════════════════════
//  ADVANCE
// ═══════════════════════════════════════════════════════════════════════

/// Drive one swap as far as current conditions allow. Safe to call from
/// any number of tasks; terminal swaps are returned untouched.
pub async fn advance(orch: &Orchestrator, swap_id: &str) -> VeilResult<Swap> {
    let snapshot = orch
        .registry()
        .get(swap_id)
        .ok_or_else(|| VeilError::UnknownSwap(swap_id.to_string()))?;
    if snapshot.is_terminal() {
        return Ok(snapshot);
    }

    // ── 1. Refresh leg-1 provider info ──────────────────────────────
    let leg1_info = fetch_info(orch, &snapshot, Leg::One).await;
    let leg1_status = leg1_info
        .as_ref()
        .map(|i| i.status_text.clone())
        .unwrap_or_else(|| snapshot.leg1.status.clone());

    if is_refund_status(&leg1_status) {
        let (updated, _) = orch.registry().update(swap_id, |s| {
            apply_leg1_info(s, &leg1_info);
            if !s.expired && !s.refunded {
                s.refunded = true;
                s.status = status::REFUNDED.into();
                s.push_timeline(status::REFUNDED);
            }
        })?;
        info!(swap_id, "leg1 refunded by provider");
        return Ok(updated);
    }

    // ── 2. Expiry ───────────────────────────────────────────────────
    // A swap with a leg-2 order in flight (or stuck pending operator
    // reconciliation) holds routed or routable XMR and must never be
    // flipped to expired by a stale leg-1 view.
    if !snapshot.leg2.created && !snapshot.leg2.creating {
        let age_secs = (Utc::now() - snapshot.created_at).num_seconds();
        let stale = age_secs > SWAP_EXPIRY_SECS && is_waiting_status(&leg1_status);
        if is_hard_expired_status(&leg1_status) || stale {
            let (updated, _) = orch.registry().update(swap_id, |s| {
                apply_leg1_info(s, &leg1_info);
                if !s.expired && !s.refunded {
                    s.expired = true;
                    s.status = status::EXPIRED.into();
                    s.push_timeline(status::EXPIRED);
                }
            })?;
            info!(swap_id, age_secs, "swap expired");
            return Ok(updated);
        }
    }

    // ── 3–4. Wallet-side confirmation, compute what to forward ──────
    // The wallet is authoritative for "did the user actually pay us".
    let rx = orch.wallet().sum_received(snapshot.subaddress.index).await;
    let need =
        (rx - snapshot.our_fee_xmr - orch.settings().send_fee_reserve).max(Decimal::ZERO);

    if need <= Decimal::ZERO {
        let (updated, _) = orch.registry().update(swap_id, |s| {
            apply_leg1_info(s, &leg1_info);
            s.received_xmr = rx;
        })?;
        return Ok(updated);
    }

    // ── 5. Unlock gate (strict <: exactly-equal proceeds) ───────────
    if !snapshot.leg2.created && !snapshot.leg2.creating {
        let unlocked = match orch.wallet().unlocked_balance().await {
            Ok(u) => u,
            Err(e) => {
                warn!(swap_id, error = %e, "unlocked_balance failed; retrying next sweep");
                Decimal::ZERO
            }
        };
        if unlocked < need {
            let (updated, _) = orch.registry().update(swap_id, |s| {
                apply_leg1_info(s, &leg1_info);
                s.received_xmr = rx;
                if !s.is_terminal() {
                    s.status = status::AWAITING_WALLET_UNLOCK.into();
                    s.push_timeline(status::AWAITING_WALLET_UNLOCK);
                }
            })?;
            debug!(swap_id, %unlocked, %need, "waiting for wallet unlock");
            return Ok(updated);
        }
    }

    // ── 6. Leg-2 creation guard, flipped under the lock ─────────────
    let (_, should_create) = orch.registry().update(swap_id, |s| {
        apply_leg1_info(s, &leg1_info);
        s.received_xmr = rx;
        if !s.leg2.created && !s.leg2.creating && !s.expired && !s.refunded {
            s.leg2.creating = true;
            true
        } else {
            false
        }
    })?;

    // ── 7–8. Create the leg-2 order and forward the XMR ─────────────
    if should_create {
        create_and_fund_leg2(orch, swap_id, &snapshot, need).await?;
    }

    // ── 9. Refresh leg-2 provider info ──────────────────────────────
    let current = orch
        .registry()
        .get(swap_id)
        .ok_or_else(|| VeilError::UnknownSwap(swap_id.to_string()))?;
    if current.leg2.created && current.leg2.order_id.is_some() {
        if let Some(info) = fetch_info(orch, &current, Leg::Two).await {
            let (updated, _) = orch.registry().update(swap_id, |s| {
                s.leg2.last_info = Some(info.raw.clone());
                s.leg2.status = info.status_text.clone();
                if s.expired || s.refunded {
                    return;
                }
                if is_refund_status(&info.status_text) {
                    s.refunded = true;
                    s.status = status::REFUNDED.into();
                    s.push_timeline(status::REFUNDED);
                } else if veil_common::types::is_finished_status(&info.status_text) {
                    s.status = status::COMPLETE.into();
                    s.push_timeline(status::COMPLETE);
                } else if is_failed_status(&info.status_text) {
                    s.status = status::FAILED.into();
                    s.push_timeline(status::FAILED);
                }
            })?;
            return Ok(updated);
        }
    }

    orch.registry()
        .get(swap_id)
        .ok_or_else(|| VeilError::UnknownSwap(swap_id.to_string()))
}

/// Steps 7–8: order creation, then the forward transfer. Both failure
/// modes leave a `leg2_create_error:<reason>` diagnostic; only the
/// pre-transfer one clears `creating` so the next sweep can retry.
async fn create_and_fund_leg2(
    orch: &Orchestrator,
    swap_id: &str,
    snapshot: &Swap,
    need: Decimal,
) -> VeilResult<()> {
    let provider = orch.provider(snapshot.leg2.provider)?;
    let q = &snapshot.request.quote;

    let created = provider
        .create(&CreateOrderRequest {
            from_asset: Asset::Xmr,
            from_network: None,
            to_asset: q.out_asset,
            to_network: q.out_network,
            amount: need,
            payout_address: snapshot.request.payout_address.clone(),
            rate_type: q.rate_type,
            // Any leg-2 refund returns to our wallet, never to the user.
            refund_address: Some(snapshot.subaddress.address.clone()),
        })
        .await;

    let order = match created {
        Ok(order) => order,
        Err(e) => {
            let reason = match &e {
                VeilError::ProviderCreateFailed { message, .. }
                    if message.contains("empty deposit") =>
                {
                    "empty_deposit"
                }
                _ => "create_failed",
            };
            warn!(swap_id, error = %e, "leg2 create failed; will retry next sweep");
            orch.registry().update(swap_id, |s| {
                s.leg2.creating = false;
                s.status = format!("{}:{reason}", status::LEG2_CREATE_ERROR);
                s.leg2.status = s.status.clone();
            })?;
            return Ok(());
        }
    };

    match orch.wallet().transfer(&order.deposit_address, need).await {
        Ok(txid) => {
            orch.registry().update(swap_id, |s| {
                s.leg2.creating = false;
                s.leg2.created = true;
                s.leg2.order_id = Some(order.order_id.clone());
                s.leg2.last_info = Some(order.raw.clone());
                s.last_sent_txid = Some(txid.clone());
                s.status = status::LEG2_ROUTING.into();
                s.push_timeline(status::ROUTING_XMR_TO_LEG2);
            })?;
            info!(swap_id, %need, "forwarded XMR to leg2");
        }
        Err(e) => {
            // The order exists but our XMR never left. Keep `creating` set
            // so no duplicate order or send can happen; an operator has to
            // reconcile (funds are still in our wallet).
            warn!(swap_id, error = %e, "wallet transfer failed after leg2 create");
            orch.registry().update(swap_id, |s| {
                s.leg2.order_id = Some(order.order_id.clone());
                s.leg2.last_info = Some(order.raw.clone());
                s.status = format!("{}:wallet_send", status::LEG2_CREATE_ERROR);
                s.leg2.status = s.status.clone();
            })?;
        }
    }

    Ok(())
}

enum Leg {
    One,
    Two,
}

/// Provider info with transient failures swallowed — the swap keeps its
/// previous view and the next sweep retries.
async fn fetch_info(orch: &Orchestrator, swap: &Swap, leg: Leg) -> Option<OrderInfo> {
    let (provider_id, order_id) = match leg {
        Leg::One => (swap.leg1.provider, Some(swap.leg1.order_id.clone())),
        Leg::Two => (swap.leg2.provider, swap.leg2.order_id.clone()),
    };
    let order_id = order_id.filter(|id| !id.is_empty())?;
    let provider = orch.provider(provider_id).ok()?;
    match provider.info(&order_id).await {
        Ok(info) => Some(info),
        Err(e) => {
            debug!(swap_id = %swap.id, provider = %provider_id, error = %e, "info fetch failed");
            None
        }
    }
}

fn apply_leg1_info(swap: &mut Swap, info: &Option<OrderInfo>) {
    if let Some(info) = info {
        swap.leg1.last_info = Some(info.raw.clone());
        swap.leg1.status = info.status_text.clone();
    }
}
