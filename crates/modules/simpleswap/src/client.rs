//! SimpleSwap exchange module (API v1).
//!
//! The quirkiest of the four adapters. Estimates may come back as a JSON
//! number, a quoted number, an object, or a bare number as plain text —
//! all are normalized here. Order creation runs a three-step fallback
//! ladder (api_key query param → X-Api-Key header → legacy GET) because
//! different deployments of the API accept different auth placements.
//! Token networks are spelled erc20/trc20/bep20; native coins omit the
//! network entirely.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use veil_common::error::{VeilError, VeilResult};
use veil_common::parse::{amount_field, status_text, string_field};
use veil_common::traits::{
    CreateOrderRequest, CreatedOrder, Estimate, EstimateRequest, OrderInfo, SwapProvider,
};
use veil_common::types::{Asset, Network, ProviderId, RateType};

/// SimpleSwap API base URL.
const SIMPLESWAP_API_BASE: &str = "https://api.simpleswap.io/v1";

/// SimpleSwap exchange module.
pub struct SimpleSwapModule {
    http: reqwest::Client,
    api_key: String,
}

/// SimpleSwap network tag. Native coins omit the network; tokens map to
/// the chain-tag convention.
pub fn map_network(asset: Asset, network: Option<Network>) -> Option<&'static str> {
    if matches!(asset, Asset::Btc | Asset::Ltc | Asset::Xmr | Asset::Eth) {
        return None;
    }
    match network? {
        Network::Eth => Some("erc20"),
        Network::Trx => Some("trc20"),
        Network::Bsc => Some("bep20"),
        _ => None,
    }
}

fn fixed_param(rate_type: RateType) -> &'static str {
    match rate_type {
        RateType::Fixed => "true",
        RateType::Float => "false",
    }
}

/// Parse a response body that may or may not be JSON.
fn lenient_json(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Pull an estimated amount out of whatever shape came back.
fn estimated_amount(raw: &Value) -> Decimal {
    match raw {
        Value::Number(_) | Value::String(_) => veil_common::parse::decimal_from_value(raw),
        Value::Object(_) => amount_field(raw, &["estimated_amount", "toAmount"]),
        _ => Decimal::ZERO,
    }
}

/// Deposit address under any of its historical names.
fn deposit_field(raw: &Value) -> Option<String> {
    string_field(raw, &["deposit", "address_from", "payinAddress"])
}

impl SimpleSwapModule {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(12))
            .build()
            .expect("Failed to build HTTP client");

        Self { http, api_key }
    }

    fn base_query(&self, req: &EstimateRequest, with_networks: bool) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("currency_from", req.from_asset.ticker().to_lowercase()),
            ("currency_to", req.to_asset.ticker().to_lowercase()),
            ("amount", req.amount.to_string()),
            ("fixed", fixed_param(req.rate_type).to_string()),
        ];
        if with_networks {
            if let Some(net) = map_network(req.from_asset, req.from_network) {
                query.push(("network_from", net.to_string()));
            }
            if let Some(net) = map_network(req.to_asset, req.to_network) {
                query.push(("network_to", net.to_string()));
            }
        }
        if !self.api_key.is_empty() {
            query.push(("api_key", self.api_key.clone()));
        }
        query
    }

    async fn get_estimated(&self, query: &[(&'static str, String)]) -> Estimate {
        let url = format!("{SIMPLESWAP_API_BASE}/get_estimated");
        let resp = match self.http.get(&url).query(query).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "simpleswap estimate unreachable");
                return Estimate::zero();
            }
        };
        let ok = resp.status().is_success();
        let text = resp.text().await.unwrap_or_default();
        let raw = lenient_json(&text);

        if !ok {
            return Estimate::zero();
        }
        let to_amount = estimated_amount(&raw);
        if to_amount > Decimal::ZERO {
            Estimate { to_amount, raw }
        } else {
            Estimate::zero()
        }
    }
}

#[async_trait]
impl SwapProvider for SimpleSwapModule {
    fn id(&self) -> ProviderId {
        ProviderId::SimpleSwap
    }

    async fn estimate(&self, req: &EstimateRequest) -> Estimate {
        let hinted = self.get_estimated(&self.base_query(req, true)).await;
        if hinted.is_usable() {
            return hinted;
        }
        let bare = self.get_estimated(&self.base_query(req, false)).await;
        if bare.is_usable() {
            return bare;
        }
        let mut nudged = req.clone();
        nudged.amount = (req.amount * Decimal::new(999, 3)).max(Decimal::new(1, 12));
        self.get_estimated(&self.base_query(&nudged, true)).await
    }

    async fn create(&self, req: &CreateOrderRequest) -> VeilResult<CreatedOrder> {
        let nf = map_network(req.from_asset, req.from_network);
        let nt = map_network(req.to_asset, req.to_network);

        let mut payload = serde_json::json!({
            "currency_from": req.from_asset.ticker().to_lowercase(),
            "currency_to": req.to_asset.ticker().to_lowercase(),
            "amount": req.amount.to_string(),
            "address_to": req.payout_address,
            "fixed": fixed_param(req.rate_type),
        });
        if let Some(net) = nf {
            payload["network_from"] = net.into();
        }
        if let Some(net) = nt {
            payload["network_to"] = net.into();
        }
        if let Some(refund) = &req.refund_address {
            payload["refund_address"] = refund.clone().into();
        }

        let create_url = format!("{SIMPLESWAP_API_BASE}/create_exchange");
        // Remember the most informative failure across attempts.
        let mut last_failure = String::from("unknown error");

        // Attempt 1: POST, api_key as query param.
        let attempt = self
            .http
            .post(&create_url)
            .timeout(Duration::from_secs(30))
            .query(&[("api_key", &self.api_key)])
            .json(&payload)
            .send()
            .await;
        if let Some(order) = Self::created_from(attempt, &mut last_failure).await {
            return Ok(order);
        }

        // Attempt 2: POST, api_key as header.
        let attempt = self
            .http
            .post(&create_url)
            .timeout(Duration::from_secs(30))
            .header("X-Api-Key", &self.api_key)
            .json(&payload)
            .send()
            .await;
        if let Some(order) = Self::created_from(attempt, &mut last_failure).await {
            return Ok(order);
        }

        // Attempt 3: legacy GET endpoint.
        let mut query = vec![
            ("currency_from", req.from_asset.ticker().to_lowercase()),
            ("currency_to", req.to_asset.ticker().to_lowercase()),
            ("amount", req.amount.to_string()),
            ("address_to", req.payout_address.clone()),
            ("fixed", fixed_param(req.rate_type).to_string()),
            ("api_key", self.api_key.clone()),
        ];
        if let Some(net) = nf {
            query.push(("network_from", net.to_string()));
        }
        if let Some(net) = nt {
            query.push(("network_to", net.to_string()));
        }
        if let Some(refund) = &req.refund_address {
            query.push(("refund_address", refund.clone()));
        }
        let attempt = self
            .http
            .get(format!("{SIMPLESWAP_API_BASE}/get_exchange"))
            .timeout(Duration::from_secs(30))
            .query(&query)
            .send()
            .await;
        if let Some(order) = Self::created_from(attempt, &mut last_failure).await {
            return Ok(order);
        }

        warn!(failure = %last_failure, "simpleswap create exhausted all fallbacks");
        Err(VeilError::ProviderCreateFailed {
            provider: "simpleswap".into(),
            message: last_failure,
        })
    }

    async fn info(&self, order_id: &str) -> VeilResult<OrderInfo> {
        let url = format!("{SIMPLESWAP_API_BASE}/get_exchange");
        let mut query = vec![("id", order_id.to_string())];
        if !self.api_key.is_empty() {
            query.push(("api_key", self.api_key.clone()));
        }

        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| VeilError::Network(format!("simpleswap info: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VeilError::Provider {
                provider: "simpleswap".into(),
                message: format!("info HTTP {status}"),
            });
        }

        let raw: Value = resp.json().await.map_err(|e| VeilError::Provider {
            provider: "simpleswap".into(),
            message: format!("info parse: {e}"),
        })?;

        Ok(OrderInfo {
            status_text: status_text(&raw),
            raw,
        })
    }
}

impl SimpleSwapModule {
    /// Turn one create attempt into a normalized order, or record why it
    /// failed and let the ladder continue.
    async fn created_from(
        attempt: Result<reqwest::Response, reqwest::Error>,
        last_failure: &mut String,
    ) -> Option<CreatedOrder> {
        let resp = match attempt {
            Ok(r) => r,
            Err(e) => {
                *last_failure = format!("request failed: {e}");
                return None;
            }
        };
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let raw = lenient_json(&text);

        if !status.is_success() || !raw.is_object() {
            *last_failure = format!("HTTP {status}: {text}");
            return None;
        }

        let deposit_address = match deposit_field(&raw) {
            Some(addr) => addr,
            None => {
                *last_failure = format!("HTTP {status}: missing deposit address");
                return None;
            }
        };
        Some(CreatedOrder {
            order_id: string_field(&raw, &["id"]).unwrap_or_default(),
            deposit_address,
            deposit_extra: string_field(&raw, &["extra_id_from", "payinExtraId"]),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_map_network_native_coins_omit() {
        assert_eq!(map_network(Asset::Btc, Some(Network::Btc)), None);
        assert_eq!(map_network(Asset::Eth, Some(Network::Eth)), None);
        assert_eq!(map_network(Asset::Xmr, None), None);
    }

    #[test]
    fn test_map_network_token_chains() {
        assert_eq!(map_network(Asset::Usdt, Some(Network::Eth)), Some("erc20"));
        assert_eq!(map_network(Asset::Usdt, Some(Network::Trx)), Some("trc20"));
        assert_eq!(map_network(Asset::Usdc, Some(Network::Bsc)), Some("bep20"));
        assert_eq!(map_network(Asset::Usdt, None), None);
    }

    #[test]
    fn test_estimated_amount_shapes() {
        assert_eq!(estimated_amount(&json!(1.5)), dec!(1.5));
        assert_eq!(estimated_amount(&json!("2.25")), dec!(2.25));
        assert_eq!(estimated_amount(&json!({"estimated_amount": "3.1"})), dec!(3.1));
        assert_eq!(estimated_amount(&json!({"toAmount": 4})), dec!(4));
        assert_eq!(estimated_amount(&json!(null)), Decimal::ZERO);
    }

    #[test]
    fn test_lenient_json_falls_back_to_text() {
        assert_eq!(lenient_json("0.0042"), json!(0.0042));
        assert_eq!(lenient_json("not json"), json!("not json"));
        // A bare number as text still yields an amount
        assert_eq!(estimated_amount(&lenient_json("0.0042")), dec!(0.0042));
    }

    #[test]
    fn test_deposit_field_aliases() {
        assert_eq!(
            deposit_field(&json!({"deposit": "a1"})).as_deref(),
            Some("a1")
        );
        assert_eq!(
            deposit_field(&json!({"address_from": "a2"})).as_deref(),
            Some("a2")
        );
        assert_eq!(
            deposit_field(&json!({"payinAddress": "a3"})).as_deref(),
            Some("a3")
        );
        assert_eq!(deposit_field(&json!({})), None);
    }
}
