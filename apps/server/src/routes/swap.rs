//! Swap lifecycle endpoints: start and status.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use veil_common::types::{StartSwapRequest, Swap};

use crate::routes::ApiError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start", post(post_start))
        .route("/status/:swap_id", get(get_status))
}

/// What the user needs to fund leg 1.
#[derive(Debug, Serialize)]
struct StartSwapResponse {
    swap_id: String,
    deposit_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    deposit_extra: Option<String>,
    leg1_tx_id: String,
    status: String,
}

async fn post_start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSwapRequest>,
) -> Result<Json<StartSwapResponse>, ApiError> {
    let swap = state.orchestrator.start(req).await?;
    Ok(Json(StartSwapResponse {
        swap_id: swap.id.clone(),
        deposit_address: swap.leg1.deposit_address.clone(),
        deposit_extra: swap.leg1.deposit_extra.clone(),
        leg1_tx_id: swap.leg1.order_id.clone(),
        status: swap.status,
    }))
}

/// One `advance` pass, then the full swap record. 404 for unknown ids.
async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(swap_id): Path<String>,
) -> Result<Json<Swap>, ApiError> {
    let swap = state.orchestrator.advance(&swap_id).await?;
    Ok(Json(swap))
}
