//! Mid-market USD price oracle (CoinGecko).
//!
//! Advisory only: feeds the provider-spread heuristic and the StealthEX
//! haircut estimate. Any failure — timeout, non-2xx, missing key — fills
//! in the constant defaults so quoting never stalls on the oracle.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

use veil_common::parse::decimal_from_value;
use veil_common::traits::PriceFeed;
use veil_common::types::{Asset, PriceTable};

/// CoinGecko simple-price endpoint.
const COINGECKO_PRICE_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// CoinGecko id per asset.
const CG_IDS: [(Asset, &str); 6] = [
    (Asset::Btc, "bitcoin"),
    (Asset::Eth, "ethereum"),
    (Asset::Usdt, "tether"),
    (Asset::Usdc, "usd-coin"),
    (Asset::Ltc, "litecoin"),
    (Asset::Xmr, "monero"),
];

/// CoinGecko-backed price feed.
pub struct CoinGeckoOracle {
    http: reqwest::Client,
}

impl CoinGeckoOracle {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self { http }
    }
}

impl Default for CoinGeckoOracle {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a simple-price payload into a full table, patching every missing or
/// zero entry with its fallback constant.
fn table_from_response(raw: &Value) -> PriceTable {
    let fallback = PriceTable::fallback();
    let mut usd = HashMap::new();
    for (asset, id) in CG_IDS {
        let price = raw
            .get(id)
            .and_then(|entry| entry.get("usd"))
            .map(decimal_from_value)
            .unwrap_or(Decimal::ZERO);
        if price > Decimal::ZERO {
            usd.insert(asset, price);
        } else {
            usd.insert(asset, fallback.usd(asset));
        }
    }
    PriceTable { usd }
}

#[async_trait]
impl PriceFeed for CoinGeckoOracle {
    async fn usd_prices(&self) -> PriceTable {
        let ids = CG_IDS.map(|(_, id)| id).join(",");
        let resp = self
            .http
            .get(COINGECKO_PRICE_URL)
            .query(&[("ids", ids.as_str()), ("vs_currencies", "usd")])
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => match r.json::<Value>().await {
                Ok(raw) => table_from_response(&raw),
                Err(e) => {
                    warn!(error = %e, "price oracle returned unparseable body");
                    PriceTable::fallback()
                }
            },
            Ok(r) => {
                warn!(status = %r.status(), "price oracle returned error status");
                PriceTable::fallback()
            }
            Err(e) => {
                warn!(error = %e, "price oracle unreachable");
                PriceTable::fallback()
            }
        }
    }
}
