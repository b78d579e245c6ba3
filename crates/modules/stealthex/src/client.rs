//! StealthEX exchange module (API v4).
//!
//! StealthEX has no stable network-naming convention across pairs, so the
//! adapter discovers one per call: it walks a small candidate list through
//! `POST /v4/rates/range` until the API accepts the pair, then reuses the
//! accepted pair for the rest of that estimate/create. Estimates are
//! computed from mid-market USD with a configurable haircut instead of
//! creating a throwaway order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use veil_common::error::{VeilError, VeilResult};
use veil_common::parse::{amount_field, status_text, string_field};
use veil_common::traits::{
    CreateOrderRequest, CreatedOrder, Estimate, EstimateRequest, OrderInfo, PriceFeed,
    SwapProvider,
};
use veil_common::types::{Asset, Network, ProviderId, RateType};

/// StealthEX API v4 base URL.
const STEALTHEX_API_BASE: &str = "https://api.stealthex.io/v4";

/// StealthEX exchange module.
pub struct StealthExModule {
    http: reqwest::Client,
    api_key: String,
    /// Mid-market source for haircut estimates.
    prices: Arc<dyn PriceFeed>,
    /// Fraction of the mid-market output kept in estimates (e.g. 0.93).
    haircut: Decimal,
}

/// Network name candidates in priority order, per asset.
pub fn network_candidates(asset: Asset, network: Option<Network>) -> &'static [&'static str] {
    if !asset.is_token() {
        // Coins: StealthEX uses "mainnet"
        return &["mainnet"];
    }
    match network {
        Some(Network::Eth) => &["ethereum", "erc20", "mainnet"],
        Some(Network::Trx) => &["tron", "trc20", "mainnet"],
        Some(Network::Bsc) => &["bsc", "bep20", "mainnet"],
        _ => &["mainnet"],
    }
}

fn rate_param(rate_type: RateType) -> &'static str {
    match rate_type {
        RateType::Fixed => "fixed",
        RateType::Float => "floating",
    }
}

fn lenient_json(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// A 2xx body carrying an `err` key is still a failure.
fn has_err(raw: &Value) -> bool {
    raw.get("err").map(|v| !v.is_null()).unwrap_or(false)
}

/// Outcome of the per-call network discovery.
struct DiscoveredRoute {
    net_from: &'static str,
    net_to: &'static str,
    range: Value,
}

impl StealthExModule {
    pub fn new(api_key: String, prices: Arc<dyn PriceFeed>, haircut: Decimal) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            api_key,
            prices,
            haircut,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Accept", "application/json");
        if self.api_key.is_empty() {
            builder
        } else {
            builder
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
        }
    }

    fn route_body(
        from_asset: Asset,
        net_from: &str,
        to_asset: Asset,
        net_to: &str,
        rate_type: RateType,
    ) -> Value {
        serde_json::json!({
            "route": {
                "from": {"symbol": from_asset.ticker().to_lowercase(), "network": net_from},
                "to":   {"symbol": to_asset.ticker().to_lowercase(),   "network": net_to},
            },
            "estimation": "direct",
            "rate": rate_param(rate_type),
        })
    }

    /// One `/rates/range` probe. Ok(json) when the API accepts the pair.
    async fn probe_range(
        &self,
        from_asset: Asset,
        net_from: &str,
        to_asset: Asset,
        net_to: &str,
        rate_type: RateType,
    ) -> Option<Value> {
        let url = format!("{STEALTHEX_API_BASE}/rates/range");
        let body = Self::route_body(from_asset, net_from, to_asset, net_to, rate_type);

        let resp = self.request(self.http.post(&url)).json(&body).send().await;
        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "stealthex range unreachable");
                return None;
            }
        };
        let status = resp.status();
        let raw = lenient_json(&resp.text().await.unwrap_or_default());

        if status.is_success() && !has_err(&raw) {
            Some(raw)
        } else {
            None
        }
    }

    /// Walk candidate network names until `/rates/range` accepts the pair.
    /// The accepted pair is reused for the rest of the call — no re-probing.
    async fn discover_route(
        &self,
        from_asset: Asset,
        from_network: Option<Network>,
        to_asset: Asset,
        to_network: Option<Network>,
        rate_type: RateType,
    ) -> Option<DiscoveredRoute> {
        for net_from in network_candidates(from_asset, from_network) {
            for net_to in network_candidates(to_asset, to_network) {
                if let Some(range) = self
                    .probe_range(from_asset, net_from, to_asset, net_to, rate_type)
                    .await
                {
                    return Some(DiscoveredRoute {
                        net_from,
                        net_to,
                        range,
                    });
                }
            }
        }
        None
    }

    /// Conservative mid-market output: amount × p_from / p_to × haircut.
    async fn haircut_estimate(&self, req: &EstimateRequest) -> Decimal {
        let prices = self.prices.usd_prices().await;
        let p_from = prices.usd(req.from_asset);
        let p_to = prices.usd(req.to_asset);
        if p_from <= Decimal::ZERO || p_to <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let raw_out = req.amount * p_from / p_to;
        (raw_out * self.haircut).max(Decimal::ZERO).round_dp(8)
    }
}

#[async_trait]
impl SwapProvider for StealthExModule {
    fn id(&self) -> ProviderId {
        ProviderId::StealthEx
    }

    async fn estimate(&self, req: &EstimateRequest) -> Estimate {
        if req.amount <= Decimal::ZERO {
            return Estimate::zero();
        }

        // Confirm the pair and its minimum via the range probe.
        let Some(route) = self
            .discover_route(
                req.from_asset,
                req.from_network,
                req.to_asset,
                req.to_network,
                req.rate_type,
            )
            .await
        else {
            return Estimate::zero();
        };

        let min_amount = amount_field(&route.range, &["min_amount"]);
        if min_amount > Decimal::ZERO && req.amount < min_amount {
            return Estimate::zero();
        }

        // No throwaway order: price off mid-market with a safety haircut.
        let to_amount = self.haircut_estimate(req).await;
        if to_amount > Decimal::ZERO {
            Estimate {
                to_amount,
                raw: route.range,
            }
        } else {
            Estimate::zero()
        }
    }

    async fn create(&self, req: &CreateOrderRequest) -> VeilResult<CreatedOrder> {
        let route = self
            .discover_route(
                req.from_asset,
                req.from_network,
                req.to_asset,
                req.to_network,
                req.rate_type,
            )
            .await
            .ok_or_else(|| VeilError::ProviderCreateFailed {
                provider: "stealthex".into(),
                message: format!(
                    "pair/networks not supported: {}({:?}) -> {}({:?})",
                    req.from_asset, req.from_network, req.to_asset, req.to_network
                ),
            })?;

        let mut body = Self::route_body(
            req.from_asset,
            route.net_from,
            req.to_asset,
            route.net_to,
            req.rate_type,
        );
        body["amount"] = serde_json::json!(req.amount.to_f64().unwrap_or(0.0));
        body["address"] = req.payout_address.clone().into();

        let url = format!("{STEALTHEX_API_BASE}/exchanges");
        let resp = self
            .request(self.http.post(&url))
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await
            .map_err(|e| VeilError::Network(format!("stealthex create: {e}")))?;

        let status = resp.status();
        let raw = lenient_json(&resp.text().await.unwrap_or_default());

        if !status.is_success() || has_err(&raw) {
            warn!(%status, "stealthex create rejected");
            return Err(VeilError::ProviderCreateFailed {
                provider: "stealthex".into(),
                message: format!("HTTP {status}: {raw}"),
            });
        }

        let deposit = raw.get("deposit").cloned().unwrap_or(Value::Null);
        let deposit_address = string_field(&deposit, &["address"]).unwrap_or_default();
        if deposit_address.is_empty() {
            return Err(VeilError::ProviderCreateFailed {
                provider: "stealthex".into(),
                message: "empty deposit address".into(),
            });
        }

        Ok(CreatedOrder {
            order_id: string_field(&raw, &["id"]).unwrap_or_default(),
            deposit_address,
            deposit_extra: string_field(&deposit, &["extra_id"]),
            raw,
        })
    }

    async fn info(&self, order_id: &str) -> VeilResult<OrderInfo> {
        let url = format!("{STEALTHEX_API_BASE}/exchanges/{order_id}");
        let resp = self
            .request(self.http.get(&url))
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(|e| VeilError::Network(format!("stealthex info: {e}")))?;

        let status = resp.status();
        let raw = lenient_json(&resp.text().await.unwrap_or_default());

        if !status.is_success() || has_err(&raw) {
            return Err(VeilError::Provider {
                provider: "stealthex".into(),
                message: format!("info HTTP {status}: {raw}"),
            });
        }

        Ok(OrderInfo {
            status_text: status_text(&raw),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;
    use veil_common::types::PriceTable;

    struct FixedPrices;

    #[async_trait]
    impl PriceFeed for FixedPrices {
        async fn usd_prices(&self) -> PriceTable {
            PriceTable {
                usd: HashMap::from([
                    (Asset::Btc, dec!(60000)),
                    (Asset::Ltc, dec!(70)),
                    (Asset::Xmr, dec!(160)),
                ]),
            }
        }
    }

    fn module() -> StealthExModule {
        StealthExModule::new(String::new(), Arc::new(FixedPrices), dec!(0.93))
    }

    #[test]
    fn test_candidates_coins_use_mainnet() {
        assert_eq!(network_candidates(Asset::Btc, Some(Network::Btc)), ["mainnet"]);
        assert_eq!(network_candidates(Asset::Xmr, None), ["mainnet"]);
    }

    #[test]
    fn test_candidates_tokens_by_chain() {
        assert_eq!(
            network_candidates(Asset::Usdt, Some(Network::Eth)),
            ["ethereum", "erc20", "mainnet"]
        );
        assert_eq!(
            network_candidates(Asset::Usdt, Some(Network::Trx)),
            ["tron", "trc20", "mainnet"]
        );
        assert_eq!(
            network_candidates(Asset::Usdc, Some(Network::Bsc)),
            ["bsc", "bep20", "mainnet"]
        );
        assert_eq!(network_candidates(Asset::Usdt, None), ["mainnet"]);
    }

    #[test]
    fn test_err_key_detection() {
        assert!(has_err(&json!({"err": "bad pair"})));
        assert!(!has_err(&json!({"err": null})));
        assert!(!has_err(&json!({"min_amount": 1})));
    }

    #[tokio::test]
    async fn test_haircut_estimate_math() {
        let m = module();
        let req = EstimateRequest {
            from_asset: Asset::Btc,
            from_network: Some(Network::Btc),
            to_asset: Asset::Ltc,
            to_network: Some(Network::Ltc),
            amount: dec!(0.01),
            rate_type: RateType::Float,
        };
        // 0.01 BTC = $600 → 600/70 LTC × 0.93
        let out = m.haircut_estimate(&req).await;
        assert_eq!(out, (dec!(600) / dec!(70) * dec!(0.93)).round_dp(8));
    }

    #[tokio::test]
    async fn test_haircut_estimate_zero_when_price_missing() {
        let m = module();
        let req = EstimateRequest {
            from_asset: Asset::Usdc, // not in FixedPrices
            from_network: Some(Network::Eth),
            to_asset: Asset::Ltc,
            to_network: Some(Network::Ltc),
            amount: dec!(100),
            rate_type: RateType::Float,
        };
        assert_eq!(m.haircut_estimate(&req).await, Decimal::ZERO);
    }
}
