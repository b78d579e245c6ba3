//! Exolix exchange module (API v2).
//!
//! Exolix spells networks upper-case and, on order creation, requires one
//! for both sides — native coins use their own ticker as the network tag.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use veil_common::error::{VeilError, VeilResult};
use veil_common::parse::{amount_field, status_text, string_field};
use veil_common::traits::{
    CreateOrderRequest, CreatedOrder, Estimate, EstimateRequest, OrderInfo, SwapProvider,
};
use veil_common::types::{Asset, Network, ProviderId, RateType};

/// Exolix API v2 base URL.
const EXOLIX_API_BASE: &str = "https://exolix.com/api/v2";

/// Exolix exchange module.
pub struct ExolixModule {
    http: reqwest::Client,
    /// Full Authorization header value, empty when unauthenticated.
    auth: String,
}

/// Upper-case network tag for estimates, omitted when the caller gave none.
fn network_hint(network: Option<Network>) -> Option<String> {
    network.map(|n| n.tag().to_string())
}

/// Create requires a network on both sides; native coins (and XMR) fall
/// back to their own ticker.
fn create_network(asset: Asset, network: Option<Network>) -> String {
    network_hint(network).unwrap_or_else(|| asset.ticker().to_string())
}

fn rate_type_param(rate_type: RateType) -> &'static str {
    match rate_type {
        RateType::Float => "float",
        RateType::Fixed => "fixed",
    }
}

impl ExolixModule {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build HTTP client");

        // Tolerate keys pasted with the scheme already attached.
        let auth = if api_key.is_empty() {
            String::new()
        } else if api_key.to_lowercase().starts_with("bearer ") {
            api_key
        } else {
            format!("Bearer {api_key}")
        };

        Self { http, auth }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Accept", "application/json");
        if self.auth.is_empty() {
            builder
        } else {
            builder.header("Authorization", &self.auth)
        }
    }

    async fn rate(&self, req: &EstimateRequest, amount: Decimal, with_networks: bool) -> Estimate {
        let url = format!("{EXOLIX_API_BASE}/rate");
        let amount_str = amount.to_string();
        let mut query: Vec<(&str, String)> = vec![
            ("coinFrom", req.from_asset.ticker().to_string()),
            ("coinTo", req.to_asset.ticker().to_string()),
            ("amount", amount_str),
            ("rateType", rate_type_param(req.rate_type).to_string()),
        ];
        if with_networks {
            if let Some(net) = network_hint(req.from_network) {
                query.push(("networkFrom", net));
            }
            if let Some(net) = network_hint(req.to_network) {
                query.push(("networkTo", net));
            }
        }

        let resp = match self.request(self.http.get(&url)).query(&query).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "exolix rate unreachable");
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

        let to_amount = amount_field(&raw, &["toAmount"]);
        if to_amount > Decimal::ZERO {
            Estimate { to_amount, raw }
        } else {
            Estimate::zero()
        }
    }
}

#[async_trait]
impl SwapProvider for ExolixModule {
    fn id(&self) -> ProviderId {
        ProviderId::Exolix
    }

    async fn estimate(&self, req: &EstimateRequest) -> Estimate {
        let hinted = self.rate(req, req.amount, true).await;
        if hinted.is_usable() {
            return hinted;
        }
        let bare = self.rate(req, req.amount, false).await;
        if bare.is_usable() {
            return bare;
        }
        let nudged = (req.amount * Decimal::new(999, 3)).max(Decimal::new(1, 12));
        self.rate(req, nudged, true).await
    }

    async fn create(&self, req: &CreateOrderRequest) -> VeilResult<CreatedOrder> {
        let url = format!("{EXOLIX_API_BASE}/transactions");
        let body = serde_json::json!({
            "coinFrom": req.from_asset.ticker(),
            "coinTo": req.to_asset.ticker(),
            "networkFrom": create_network(req.from_asset, req.from_network),
            "networkTo": create_network(req.to_asset, req.to_network),
            "amount": req.amount.to_f64().unwrap_or(0.0),
            "withdrawalAddress": req.payout_address,
            "rateType": rate_type_param(req.rate_type),
        });

        let resp = self
            .request(self.http.post(&url))
            .timeout(Duration::from_secs(20))
            .json(&body)
            .send()
            .await
            .map_err(|e| VeilError::Network(format!("exolix create: {e}")))?;

        let status = resp.status();
        let raw: serde_json::Value = resp.json().await.unwrap_or_default();

        if !status.is_success() {
            warn!(%status, "exolix create rejected");
            return Err(VeilError::ProviderCreateFailed {
                provider: "exolix".into(),
                message: format!("HTTP {status}: {raw}"),
            });
        }

        let deposit_address = string_field(&raw, &["depositAddress"]).unwrap_or_default();
        if deposit_address.is_empty() {
            return Err(VeilError::ProviderCreateFailed {
                provider: "exolix".into(),
                message: "empty deposit address".into(),
            });
        }

        Ok(CreatedOrder {
            order_id: string_field(&raw, &["id"]).unwrap_or_default(),
            deposit_address,
            deposit_extra: string_field(&raw, &["depositExtraId"]),
            raw,
        })
    }

    async fn info(&self, order_id: &str) -> VeilResult<OrderInfo> {
        let url = format!("{EXOLIX_API_BASE}/transactions/{order_id}");
        let resp = self
            .request(self.http.get(&url))
            .send()
            .await
            .map_err(|e| VeilError::Network(format!("exolix info: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VeilError::Provider {
                provider: "exolix".into(),
                message: format!("info HTTP {status}"),
            });
        }

        let raw: serde_json::Value = resp.json().await.map_err(|e| VeilError::Provider {
            provider: "exolix".into(),
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
    fn test_create_network_defaults_to_ticker() {
        assert_eq!(create_network(Asset::Btc, None), "BTC");
        assert_eq!(create_network(Asset::Xmr, None), "XMR");
        assert_eq!(create_network(Asset::Usdt, Some(Network::Trx)), "TRX");
    }

    #[test]
    fn test_bearer_prefix_tolerated() {
        let m = ExolixModule::new("Bearer abc".into());
        assert_eq!(m.auth, "Bearer abc");
        let m = ExolixModule::new("abc".into());
        assert_eq!(m.auth, "Bearer abc");
        let m = ExolixModule::new(String::new());
        assert!(m.auth.is_empty());
    }
}
