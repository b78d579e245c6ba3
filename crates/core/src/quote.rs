//! Quote aggregation and route selection.
//!
//! Fans `estimate` out across every provider for leg 1 (input → XMR),
//! applies the fee policy, then prices every leg-2 candidate (XMR →
//! output) on each *other* provider. Requiring leg1 ≠ leg2 is the point of
//! the whole system: no single exchange sees both halves of the flow.

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use veil_common::constants::FEE_POLICY_MIRROR_CAPPED;
use veil_common::error::{VeilError, VeilResult};
use veil_common::traits::{Estimate, EstimateRequest};
use veil_common::types::{
    Asset, FeeBreakdown, LegQuote, PriceTable, ProviderId, QuoteRequest, RouteOption,
};

use crate::orchestrator::Orchestrator;

/// Routes sorted by `receive_out` descending; `best_index` is always 0.
#[derive(Debug, Clone, Serialize)]
pub struct RankedRoutes {
    pub routes: Vec<RouteOption>,
    pub best_index: usize,
}

// ── Fee policy: mirror_provider_spread_capped ───────────────────────

/// Theoretical mid-market XMR for `amount` of `asset`; zero when either
/// price is unknown.
pub fn mid_market_xmr(prices: &PriceTable, asset: Asset, amount: Decimal) -> Decimal {
    let p_in = prices.usd(asset);
    let p_xmr = prices.usd(Asset::Xmr);
    if p_in <= Decimal::ZERO || p_xmr <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    amount * p_in / p_xmr
}

/// How much worse the provider's quote is than mid-market, floored at 0.
pub fn provider_spread(mid_xmr: Decimal, leg1_xmr: Decimal) -> Decimal {
    (mid_xmr - leg1_xmr).max(Decimal::ZERO)
}

/// Our fee mirrors the spread but never exceeds `cap_ratio` of the leg-1
/// XMR amount.
pub fn capped_fee(spread: Decimal, leg1_xmr: Decimal, cap_ratio: Decimal) -> Decimal {
    spread.min(cap_ratio * leg1_xmr)
}

/// XMR actually forwarded to leg 2 after fee and miner reserve.
pub fn forward_amount(leg1_xmr: Decimal, fee: Decimal, reserve: Decimal) -> Decimal {
    (leg1_xmr - fee - reserve).max(Decimal::ZERO)
}

// ── Aggregation ─────────────────────────────────────────────────────

fn leg1_request(req: &QuoteRequest) -> EstimateRequest {
    EstimateRequest {
        from_asset: req.in_asset,
        from_network: req.in_network,
        to_asset: Asset::Xmr,
        to_network: None,
        amount: req.amount,
        rate_type: req.rate_type,
    }
}

/// Leg-1 estimates from every registered provider, in registry order.
pub async fn leg1_estimates(
    orch: &Orchestrator,
    req: &QuoteRequest,
) -> Vec<(ProviderId, Estimate)> {
    let leg1_req = leg1_request(req);
    let futs = orch.provider_ids().into_iter().map(|id| {
        let provider = orch.provider(id).expect("registered provider");
        let leg1_req = leg1_req.clone();
        async move { (id, provider.estimate(&leg1_req).await) }
    });
    join_all(futs).await
}

/// Price every viable leg1 × leg2 combination and rank by payout.
pub async fn quote_routes(orch: &Orchestrator, req: &QuoteRequest) -> VeilResult<RankedRoutes> {
    req.validate()?;

    let leg1_results = leg1_estimates(orch, req).await;
    let prices = orch.prices().usd_prices().await;
    let mid_xmr = mid_market_xmr(&prices, req.in_asset, req.amount);
    let cap = orch.settings().fee_cap_ratio;
    let reserve = orch.settings().send_fee_reserve;

    let mut pair_futs = Vec::new();
    for (p1, est1) in &leg1_results {
        if !est1.is_usable() {
            debug!(provider = %p1, "leg1 unusable, hiding routes");
            continue;
        }
        let spread = provider_spread(mid_xmr, est1.to_amount);
        let fee = capped_fee(spread, est1.to_amount, cap);
        let forward = forward_amount(est1.to_amount, fee, reserve);
        if forward <= Decimal::ZERO {
            continue;
        }

        for p2 in orch.provider_ids().into_iter().filter(|p2| p2 != p1) {
            let provider2 = orch.provider(p2).expect("registered provider");
            let leg2_req = EstimateRequest {
                from_asset: Asset::Xmr,
                from_network: None,
                to_asset: req.out_asset,
                to_network: req.out_network,
                amount: forward,
                rate_type: req.rate_type,
            };
            let (p1, leg1_xmr, from_amount) = (*p1, est1.to_amount, req.amount);
            pair_futs.push(async move {
                let est2 = provider2.estimate(&leg2_req).await;
                if !est2.is_usable() {
                    return None;
                }
                Some(RouteOption {
                    leg1: LegQuote {
                        provider: p1,
                        from_amount,
                        to_amount: leg1_xmr,
                    },
                    leg2: LegQuote {
                        provider: p2,
                        from_amount: forward,
                        to_amount: est2.to_amount,
                    },
                    fees: FeeBreakdown {
                        provider_spread_xmr: spread,
                        service_fee_xmr: fee,
                        policy: FEE_POLICY_MIRROR_CAPPED.into(),
                    },
                    receive_out: est2.to_amount,
                })
            });
        }
    }

    let mut routes: Vec<RouteOption> = join_all(pair_futs).await.into_iter().flatten().collect();
    routes.sort_by(|a, b| b.receive_out.cmp(&a.receive_out));

    if routes.is_empty() {
        return Err(VeilError::NoQuote);
    }
    Ok(RankedRoutes {
        routes,
        best_index: 0,
    })
}

/// Raw per-provider view of a quote, for the diagnostics endpoint.
pub async fn quote_debug(orch: &Orchestrator, req: &QuoteRequest) -> serde_json::Value {
    let leg1_results = leg1_estimates(orch, req).await;
    let prices = orch.prices().usd_prices().await;
    let mid_xmr = mid_market_xmr(&prices, req.in_asset, req.amount);

    let leg1: Vec<serde_json::Value> = leg1_results
        .iter()
        .map(|(id, est)| {
            serde_json::json!({
                "provider": id.to_string(),
                "to_xmr": est.to_amount,
                "raw": est.raw,
            })
        })
        .collect();

    serde_json::json!({
        "mid_market_xmr": mid_xmr,
        "fee_cap_ratio": orch.settings().fee_cap_ratio,
        "send_fee_reserve": orch.settings().send_fee_reserve,
        "leg1_estimates": leg1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_orchestrator, LEG1_XMR};
    use rust_decimal_macros::dec;
    use veil_common::types::{Network, RateType};

    fn btc_to_ltc(amount: Decimal) -> QuoteRequest {
        QuoteRequest {
            in_asset: Asset::Btc,
            in_network: Some(Network::Btc),
            out_asset: Asset::Ltc,
            out_network: Some(Network::Ltc),
            amount,
            rate_type: RateType::Float,
        }
    }

    #[test]
    fn test_fee_policy_math() {
        // Spread floors at zero when the provider beats mid-market
        assert_eq!(provider_spread(dec!(3.0), dec!(3.5)), Decimal::ZERO);
        assert_eq!(provider_spread(dec!(3.75), dec!(3.70)), dec!(0.05));

        // Fee mirrors the spread until the cap bites
        assert_eq!(capped_fee(dec!(0.05), dec!(3.70), dec!(0.15)), dec!(0.05));
        assert_eq!(capped_fee(dec!(2.0), dec!(3.70), dec!(0.15)), dec!(0.5550));

        assert_eq!(
            forward_amount(dec!(3.70), dec!(0.05), dec!(0.0003)),
            dec!(3.6497)
        );
        assert_eq!(forward_amount(dec!(0.0001), dec!(0), dec!(0.0003)), Decimal::ZERO);
    }

    #[test]
    fn test_mid_market_zero_on_missing_price() {
        let mut prices = PriceTable::fallback();
        assert!(mid_market_xmr(&prices, Asset::Btc, dec!(0.01)) > Decimal::ZERO);

        prices.usd.insert(Asset::Xmr, Decimal::ZERO);
        assert_eq!(mid_market_xmr(&prices, Asset::Btc, dec!(0.01)), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_routes_never_reuse_a_provider() {
        let (orch, _, _) = test_orchestrator();
        let ranked = quote_routes(&orch, &btc_to_ltc(dec!(0.01))).await.unwrap();

        assert!(!ranked.routes.is_empty());
        for route in &ranked.routes {
            assert_ne!(route.leg1.provider, route.leg2.provider);
            assert!(route.receive_out > Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn test_fee_cap_invariant_holds_for_every_route() {
        let (orch, _, _) = test_orchestrator();
        let ranked = quote_routes(&orch, &btc_to_ltc(dec!(0.01))).await.unwrap();

        for route in &ranked.routes {
            assert!(route.fees.service_fee_xmr <= dec!(0.15) * route.leg1.to_amount);
            assert!(route.fees.service_fee_xmr >= Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn test_routes_ranked_by_receive_out() {
        let (orch, _, providers) = test_orchestrator();
        // Give one provider a visibly better leg-2 payout
        providers[&veil_common::types::ProviderId::SimpleSwap].set_leg2_out(dec!(9.9));

        let ranked = quote_routes(&orch, &btc_to_ltc(dec!(0.01))).await.unwrap();
        assert_eq!(ranked.best_index, 0);
        assert_eq!(
            ranked.routes[0].leg2.provider,
            veil_common::types::ProviderId::SimpleSwap
        );
        for pair in ranked.routes.windows(2) {
            assert!(pair[0].receive_out >= pair[1].receive_out);
        }
    }

    #[tokio::test]
    async fn test_below_minimum_everywhere_is_no_quote() {
        let (orch, _, providers) = test_orchestrator();
        for provider in providers.values() {
            provider.set_leg1_out(Decimal::ZERO);
        }

        let err = quote_routes(&orch, &btc_to_ltc(dec!(0.00000001)))
            .await
            .unwrap_err();
        assert!(matches!(err, VeilError::NoQuote));
    }

    #[tokio::test]
    async fn test_forward_amount_feeds_leg2() {
        let (orch, _, _) = test_orchestrator();
        let ranked = quote_routes(&orch, &btc_to_ltc(dec!(0.01))).await.unwrap();

        // mid = 0.01 × 60000 / 160 = 3.75; spread vs LEG1_XMR; fee uncapped
        let mid = dec!(3.75);
        let fee = mid - LEG1_XMR;
        for route in &ranked.routes {
            assert_eq!(route.fees.service_fee_xmr, fee);
            assert_eq!(route.leg2.from_amount, LEG1_XMR - fee - dec!(0.0003));
        }
    }

    #[tokio::test]
    async fn test_invalid_request_rejected() {
        let (orch, _, _) = test_orchestrator();
        let mut req = btc_to_ltc(dec!(0));
        assert!(matches!(
            quote_routes(&orch, &req).await,
            Err(VeilError::Validation(_))
        ));
        req.amount = dec!(0.01);
        req.in_network = Some(Network::Trx);
        assert!(matches!(
            quote_routes(&orch, &req).await,
            Err(VeilError::Validation(_))
        ));
    }
}
