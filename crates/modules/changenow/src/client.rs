//! ChangeNOW exchange module (API v2).
//!
//! Networks travel lower-cased (`eth`, `trx`, `bsc`); XMR never carries a
//! network hint on either side. Estimates fall back through the standard
//! ladder: hinted → unhinted → amount × 0.999 (dodges boundary-minimum
//! quirks on some pairs).

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use veil_common::error::{VeilError, VeilResult};
use veil_common::parse::{amount_field, status_text, string_field};
use veil_common::traits::{
    CreateOrderRequest, CreatedOrder, Estimate, EstimateRequest, OrderInfo, SwapProvider,
};
use veil_common::types::{Asset, Network, ProviderId, RateType};

/// ChangeNOW API v2 base URL.
const CHANGENOW_API_BASE: &str = "https://api.changenow.io/v2";

/// ChangeNOW exchange module.
pub struct ChangeNowModule {
    http: reqwest::Client,
    api_key: String,
}

/// Body for `POST /v2/exchange`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateExchangeBody {
    from_currency: String,
    to_currency: String,
    from_amount: String,
    address: String,
    flow: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refund_address: Option<String>,
}

/// Lower-case network hint, suppressed entirely for XMR.
fn network_hint(asset: Asset, network: Option<Network>) -> Option<String> {
    if asset == Asset::Xmr {
        return None;
    }
    network.map(|n| n.tag().to_lowercase())
}

fn flow(rate_type: RateType) -> &'static str {
    match rate_type {
        RateType::Float => "standard",
        RateType::Fixed => "fixed-rate",
    }
}

impl ChangeNowModule {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        Self { http, api_key }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.get(url).header("Accept", "application/json");
        if !self.api_key.is_empty() {
            req = req.header("x-changenow-api-key", &self.api_key);
        }
        req
    }

    /// One estimate attempt. Zero means unusable; never errors.
    async fn estimated(
        &self,
        req: &EstimateRequest,
        amount: Decimal,
        with_networks: bool,
    ) -> Estimate {
        let url = format!("{CHANGENOW_API_BASE}/exchange/estimated-amount");
        let amount_str = amount.to_string();
        let mut query: Vec<(&str, String)> = vec![
            ("fromCurrency", req.from_asset.ticker().to_lowercase()),
            ("toCurrency", req.to_asset.ticker().to_lowercase()),
            ("fromAmount", amount_str),
            ("flow", flow(req.rate_type).to_string()),
        ];
        if with_networks {
            if let Some(net) = network_hint(req.from_asset, req.from_network) {
                query.push(("fromNetwork", net));
            }
            if let Some(net) = network_hint(req.to_asset, req.to_network) {
                query.push(("toNetwork", net));
            }
        }

        let resp = match self.get(&url).query(&query).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "changenow estimate unreachable");
                return Estimate::zero();
            }
        };
        if !resp.status().is_success() {
            return Estimate::zero();
        }
        let raw: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(_) => return Estimate::zero(),
        };

        let to_amount = amount_field(&raw, &["toAmount", "estimatedAmount"]);
        if to_amount > Decimal::ZERO {
            Estimate { to_amount, raw }
        } else {
            Estimate::zero()
        }
    }
}

#[async_trait]
impl SwapProvider for ChangeNowModule {
    fn id(&self) -> ProviderId {
        ProviderId::ChangeNow
    }

    async fn estimate(&self, req: &EstimateRequest) -> Estimate {
        let hinted = self.estimated(req, req.amount, true).await;
        if hinted.is_usable() {
            return hinted;
        }
        let bare = self.estimated(req, req.amount, false).await;
        if bare.is_usable() {
            return bare;
        }
        // Nudge just under the amount to dodge exact-minimum rejections.
        let nudged = (req.amount * Decimal::new(999, 3)).max(Decimal::new(1, 12));
        self.estimated(req, nudged, true).await
    }

    async fn create(&self, req: &CreateOrderRequest) -> VeilResult<CreatedOrder> {
        let body = CreateExchangeBody {
            from_currency: req.from_asset.ticker().to_lowercase(),
            to_currency: req.to_asset.ticker().to_lowercase(),
            from_amount: req.amount.to_string(),
            address: req.payout_address.clone(),
            flow: flow(req.rate_type),
            from_network: network_hint(req.from_asset, req.from_network),
            to_network: network_hint(req.to_asset, req.to_network),
            refund_address: req.refund_address.clone(),
        };

        let url = format!("{CHANGENOW_API_BASE}/exchange");
        let mut request = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(20))
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.header("x-changenow-api-key", &self.api_key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| VeilError::Network(format!("changenow create: {e}")))?;

        let status = resp.status();
        let raw: serde_json::Value = resp.json().await.unwrap_or_default();

        if !status.is_success() {
            warn!(%status, "changenow create rejected");
            return Err(VeilError::ProviderCreateFailed {
                provider: "changenow".into(),
                message: format!("HTTP {status}: {raw}"),
            });
        }

        let deposit_address = string_field(&raw, &["payinAddress"]).unwrap_or_default();
        if deposit_address.is_empty() {
            return Err(VeilError::ProviderCreateFailed {
                provider: "changenow".into(),
                message: "empty deposit address".into(),
            });
        }

        Ok(CreatedOrder {
            order_id: string_field(&raw, &["id"]).unwrap_or_default(),
            deposit_address,
            deposit_extra: string_field(&raw, &["payinExtraId"]),
            raw,
        })
    }

    async fn info(&self, order_id: &str) -> VeilResult<OrderInfo> {
        let url = format!("{CHANGENOW_API_BASE}/exchange/by-id");
        let resp = self
            .get(&url)
            .query(&[("id", order_id)])
            .send()
            .await
            .map_err(|e| VeilError::Network(format!("changenow info: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VeilError::Provider {
                provider: "changenow".into(),
                message: format!("info HTTP {status}"),
            });
        }

        let raw: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| VeilError::Provider {
                provider: "changenow".into(),
                message: format!("info parse: {e}"),
            })?;

        Ok(OrderInfo {
            status_text: status_text(&raw),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xmr_suppresses_network_hint() {
        assert_eq!(network_hint(Asset::Xmr, None), None);
        assert_eq!(
            network_hint(Asset::Usdt, Some(Network::Trx)).as_deref(),
            Some("trx")
        );
        assert_eq!(
            network_hint(Asset::Btc, Some(Network::Btc)).as_deref(),
            Some("btc")
        );
    }

    #[test]
    fn test_flow_mapping() {
        assert_eq!(flow(RateType::Float), "standard");
        assert_eq!(flow(RateType::Fixed), "fixed-rate");
    }
}
