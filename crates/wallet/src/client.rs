//! Monero wallet JSON-RPC client.
//!
//! Thin typed wrapper over `monero-wallet-rpc`: subaddress creation,
//! inbound-amount attribution, unlocked balance, and the forward transfer.
//! All wire amounts are integer piconero; the [`WalletOps`] boundary speaks
//! `Decimal` XMR.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use veil_common::error::{VeilError, VeilResult};
use veil_common::traits::WalletOps;
use veil_common::types::SubAddress;
use veil_common::units::{piconero_to_xmr, xmr_to_piconero};

/// Transfer priority passed on every send (0 default .. 3 high).
const TRANSFER_PRIORITY: u32 = 2;

/// Ring size for outbound transfers.
const TRANSFER_RING_SIZE: u32 = 11;

// ── JSON-RPC envelope ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'static str,
    params: T,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

// ── Method params / results ─────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreateAddressParams<'a> {
    account_index: u32,
    label: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateAddressResult {
    address: String,
    address_index: u32,
}

#[derive(Debug, Serialize)]
struct GetTransfersParams {
    account_index: u32,
    subaddr_indices: Vec<u32>,
    #[serde(rename = "in")]
    incoming: bool,
    pending: bool,
    pool: bool,
}

#[derive(Debug, Default, Deserialize)]
struct GetTransfersResult {
    #[serde(rename = "in", default)]
    incoming: Vec<TransferEntry>,
    #[serde(default)]
    pending: Vec<TransferEntry>,
    #[serde(default)]
    pool: Vec<TransferEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct TransferEntry {
    txid: String,
    /// Piconero.
    amount: u64,
}

#[derive(Debug, Serialize)]
struct GetBalanceParams {
    account_index: u32,
}

#[derive(Debug, Deserialize)]
struct GetBalanceResult {
    /// Piconero.
    unlocked_balance: u64,
}

#[derive(Debug, Serialize)]
struct TransferParams {
    destinations: Vec<TransferDestination>,
    account_index: u32,
    priority: u32,
    ring_size: u32,
    get_tx_key: bool,
}

#[derive(Debug, Serialize)]
struct TransferDestination {
    /// Piconero.
    amount: u64,
    address: String,
}

#[derive(Debug, Deserialize)]
struct TransferResult {
    tx_hash: String,
}

// ── Client ──────────────────────────────────────────────────────────

/// Handle to one `monero-wallet-rpc` daemon. Cheap to clone.
#[derive(Clone)]
pub struct WalletRpcClient {
    http: reqwest::Client,
    url: String,
    auth: Option<(String, String)>,
}

impl WalletRpcClient {
    /// `url` is the full endpoint, e.g. `http://127.0.0.1:18083/json_rpc`.
    pub fn new(url: String, user: Option<String>, pass: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .expect("Failed to build wallet HTTP client");

        let auth = user.map(|u| (u, pass.unwrap_or_default()));

        Self { http, url, auth }
    }

    async fn rpc<P: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &'static str,
        params: P,
    ) -> VeilResult<R> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: "0",
            method,
            params,
        };

        let mut req = self.http.post(&self.url).json(&body);
        if let Some((user, pass)) = &self.auth {
            req = req.basic_auth(user, Some(pass.as_str()));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| VeilError::WalletRpc(format!("{method}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(VeilError::WalletRpc(format!("{method}: HTTP {status}")));
        }

        let envelope: JsonRpcResponse<R> = resp
            .json()
            .await
            .map_err(|e| VeilError::WalletRpc(format!("{method}: bad response: {e}")))?;

        if let Some(err) = envelope.error {
            return Err(VeilError::WalletRpc(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }

        envelope
            .result
            .ok_or_else(|| VeilError::WalletRpc(format!("{method}: empty result")))
    }
}

/// Sum unique inbound amounts, deduplicated by (txid, amount).
///
/// A replaced-by-fee or re-announced transaction shows up in both the pool
/// and the confirmed list with the same (txid, amount) pair; it must count
/// once.
fn sum_unique_amounts(entries: &[TransferEntry]) -> u64 {
    let mut seen: Vec<(&str, u64)> = Vec::with_capacity(entries.len());
    let mut total = 0u64;
    for e in entries {
        let key = (e.txid.as_str(), e.amount);
        if !seen.contains(&key) {
            seen.push(key);
            total = total.saturating_add(e.amount);
        }
    }
    total
}

#[async_trait]
impl WalletOps for WalletRpcClient {
    async fn create_subaddress(&self, label: &str) -> VeilResult<SubAddress> {
        let result: CreateAddressResult = self
            .rpc(
                "create_address",
                CreateAddressParams {
                    account_index: 0,
                    label,
                },
            )
            .await?;

        debug!(index = result.address_index, "created subaddress");

        Ok(SubAddress {
            address: result.address,
            index: result.address_index,
        })
    }

    async fn sum_received(&self, subaddr_index: u32) -> Decimal {
        let result: VeilResult<GetTransfersResult> = self
            .rpc(
                "get_transfers",
                GetTransfersParams {
                    account_index: 0,
                    subaddr_indices: vec![subaddr_index],
                    incoming: true,
                    pending: true,
                    pool: true,
                },
            )
            .await;

        match result {
            Ok(transfers) => {
                let mut all = transfers.incoming;
                all.extend(transfers.pending);
                all.extend(transfers.pool);
                piconero_to_xmr(sum_unique_amounts(&all))
            }
            Err(e) => {
                // Never fail the state machine over a read; report nothing
                // received and let the next sweep retry.
                warn!(subaddr_index, error = %e, "sum_received failed");
                Decimal::ZERO
            }
        }
    }

    async fn unlocked_balance(&self) -> VeilResult<Decimal> {
        let result: GetBalanceResult = self
            .rpc("get_balance", GetBalanceParams { account_index: 0 })
            .await?;
        Ok(piconero_to_xmr(result.unlocked_balance))
    }

    async fn transfer(&self, dest_address: &str, amount_xmr: Decimal) -> VeilResult<String> {
        let params = TransferParams {
            destinations: vec![TransferDestination {
                amount: xmr_to_piconero(amount_xmr),
                address: dest_address.to_string(),
            }],
            account_index: 0,
            priority: TRANSFER_PRIORITY,
            ring_size: TRANSFER_RING_SIZE,
            get_tx_key: true,
        };

        let result: TransferResult = self
            .rpc("transfer", params)
            .await
            .map_err(|e| VeilError::WalletSend(e.to_string()))?;

        debug!(txid = %result.tx_hash, "wallet transfer submitted");
        Ok(result.tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(txid: &str, amount: u64) -> TransferEntry {
        TransferEntry {
            txid: txid.into(),
            amount,
        }
    }

    #[test]
    fn test_sum_unique_dedups_txid_amount_pairs() {
        // Same tx visible in pool and confirmed — counted once
        let entries = vec![
            entry("aa", 650_000_000_000),
            entry("aa", 650_000_000_000),
            entry("bb", 100),
        ];
        assert_eq!(sum_unique_amounts(&entries), 650_000_000_100);
    }

    #[test]
    fn test_sum_unique_keeps_distinct_amounts_of_same_tx() {
        // One tx paying the subaddress twice with different outputs
        let entries = vec![entry("aa", 100), entry("aa", 200)];
        assert_eq!(sum_unique_amounts(&entries), 300);
    }

    #[test]
    fn test_sum_unique_empty() {
        assert_eq!(sum_unique_amounts(&[]), 0);
    }

    #[test]
    fn test_transfers_result_tolerates_missing_sections() {
        let parsed: GetTransfersResult = serde_json::from_str("{}").unwrap();
        assert!(parsed.incoming.is_empty());
        assert!(parsed.pool.is_empty());
    }
}
