//! Diagnostics: raw quote breakdowns, provider probes, version.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde_json::Value;

use veil_common::traits::EstimateRequest;
use veil_common::types::{Asset, Network, QuoteRequest, RateType};
use veil_core::quote;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/diag/quote-debug", post(quote_debug))
        .route("/diag/provider-probe", get(provider_probe))
        .route("/version", get(version))
}

/// Per-provider leg-1 estimates plus the fee inputs, raw payloads included.
async fn quote_debug(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuoteRequest>,
) -> Json<Value> {
    Json(quote::quote_debug(&state.orchestrator, &req).await)
}

/// Fire a small reference estimate (0.01 BTC → XMR) at every provider.
async fn provider_probe(State(state): State<Arc<AppState>>) -> Json<Value> {
    let orch = &state.orchestrator;
    let probe = EstimateRequest {
        from_asset: Asset::Btc,
        from_network: Some(Network::Btc),
        to_asset: Asset::Xmr,
        to_network: None,
        amount: Decimal::new(1, 2),
        rate_type: RateType::Float,
    };

    let mut out = serde_json::Map::new();
    for id in orch.provider_ids() {
        let provider = match orch.provider(id) {
            Ok(p) => p,
            Err(_) => continue,
        };
        let est = provider.estimate(&probe).await;
        out.insert(
            id.to_string(),
            serde_json::json!({
                "ok": est.is_usable(),
                "to_xmr": est.to_amount,
            }),
        );
    }
    Json(Value::Object(out))
}

async fn version() -> Json<Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
