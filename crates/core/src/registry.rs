//! Process-wide swap registry with durable JSON snapshots.
//!
//! One mutex serializes every mutation. Network I/O never happens under
//! the lock — the state machine snapshots, performs its I/O, then
//! re-acquires the lock to commit (see `engine`). After every mutation the
//! full registry is written atomically: serialize to a temp file, rename
//! over the snapshot. On startup the snapshot is restored before the
//! sweeper runs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{error, info};

use veil_common::error::{VeilError, VeilResult};
use veil_common::types::Swap;

/// Concurrency-safe store of swaps keyed by swap id.
pub struct Registry {
    swaps: Mutex<HashMap<String, Swap>>,
    /// Snapshot path; `None` keeps the registry memory-only (tests).
    path: Option<PathBuf>,
}

impl Registry {
    /// Fresh in-memory registry, optionally backed by a snapshot file.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            swaps: Mutex::new(HashMap::new()),
            path,
        }
    }

    /// Restore from the snapshot at `path`, or start empty when the file
    /// does not exist yet.
    pub fn open(path: PathBuf) -> Result<Self> {
        let swaps = if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            let map: HashMap<String, Swap> = serde_json::from_str(&data)
                .with_context(|| format!("Corrupt state file: {}", path.display()))?;
            info!(swaps = map.len(), path = %path.display(), "registry restored");
            map
        } else {
            HashMap::new()
        };

        Ok(Self {
            swaps: Mutex::new(swaps),
            path: Some(path),
        })
    }

    /// Clone of one swap, if known.
    pub fn get(&self, id: &str) -> Option<Swap> {
        self.swaps.lock().expect("registry lock poisoned").get(id).cloned()
    }

    /// Snapshot of every swap.
    pub fn all(&self) -> Vec<Swap> {
        self.swaps
            .lock()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Ids of swaps the sweeper still needs to drive.
    pub fn non_terminal_ids(&self) -> Vec<String> {
        self.swaps
            .lock()
            .expect("registry lock poisoned")
            .values()
            .filter(|s| !s.is_terminal())
            .map(|s| s.id.clone())
            .collect()
    }

    /// Register a new swap and persist.
    pub fn insert(&self, swap: Swap) {
        let mut guard = self.swaps.lock().expect("registry lock poisoned");
        guard.insert(swap.id.clone(), swap);
        self.persist_locked(&guard);
    }

    /// Mutate one swap under the lock, compact its timeline, persist, and
    /// return the updated clone plus whatever the closure produced.
    pub fn update<R>(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut Swap) -> R,
    ) -> VeilResult<(Swap, R)> {
        let mut guard = self.swaps.lock().expect("registry lock poisoned");
        let swap = guard
            .get_mut(id)
            .ok_or_else(|| VeilError::UnknownSwap(id.to_string()))?;
        let out = mutate(swap);
        swap.compact_timeline();
        let updated = swap.clone();
        self.persist_locked(&guard);
        Ok((updated, out))
    }

    /// Serialize the full map to `<path>.tmp` and rename into place.
    /// Failures are logged, never raised: the next mutation retries and
    /// the in-memory state stays authoritative for this process.
    fn persist_locked(&self, swaps: &HashMap<String, Swap>) {
        let Some(path) = &self.path else { return };
        if let Err(e) = write_snapshot(path, swaps) {
            error!(path = %path.display(), error = %e, "failed to persist registry");
        }
    }
}

fn write_snapshot(path: &Path, swaps: &HashMap<String, Swap>) -> Result<()> {
    let json = serde_json::to_string_pretty(swaps)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .with_context(|| format!("Failed to write temp snapshot: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace snapshot: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use veil_common::types::{
        status, Asset, Leg1State, Leg2State, Network, ProviderId, QuoteRequest, RateType,
        StartSwapRequest, SubAddress,
    };

    fn sample_swap(id: &str) -> Swap {
        Swap {
            id: id.into(),
            created_at: Utc::now(),
            request: StartSwapRequest {
                quote: QuoteRequest {
                    in_asset: Asset::Btc,
                    in_network: Some(Network::Btc),
                    out_asset: Asset::Ltc,
                    out_network: Some(Network::Ltc),
                    amount: dec!(0.01),
                    rate_type: RateType::Float,
                },
                leg1_provider: ProviderId::ChangeNow,
                leg2_provider: Some(ProviderId::Exolix),
                payout_address: "ltc1qpayout".into(),
                refund_address_user: None,
            },
            our_fee_xmr: dec!(0.002),
            quoted_spread_xmr: Some(dec!(0.004)),
            received_xmr: Decimal::ZERO,
            subaddress: SubAddress {
                address: "86sub".into(),
                index: 3,
            },
            leg1: Leg1State {
                provider: ProviderId::ChangeNow,
                order_id: "cn-7".into(),
                deposit_address: "bc1qdeposit".into(),
                deposit_extra: None,
                last_info: None,
                status: String::new(),
            },
            leg2: Leg2State {
                provider: ProviderId::Exolix,
                ..Default::default()
            },
            last_sent_txid: None,
            timeline: vec![status::WAITING_DEPOSIT.into()],
            expired: false,
            refunded: false,
            status: status::WAITING_DEPOSIT.into(),
        }
    }

    #[test]
    fn test_insert_get_update() {
        let reg = Registry::new(None);
        reg.insert(sample_swap("s1"));

        let got = reg.get("s1").unwrap();
        assert_eq!(got.status, status::WAITING_DEPOSIT);

        let (updated, _) = reg
            .update("s1", |s| {
                s.status = status::AWAITING_WALLET_UNLOCK.into();
            })
            .unwrap();
        assert_eq!(updated.status, status::AWAITING_WALLET_UNLOCK);
        assert!(reg.update("missing", |_| ()).is_err());
    }

    #[test]
    fn test_non_terminal_ids_skip_done_swaps() {
        let reg = Registry::new(None);
        reg.insert(sample_swap("live"));
        let mut done = sample_swap("done");
        done.expired = true;
        reg.insert(done);

        assert_eq!(reg.non_terminal_ids(), vec!["live".to_string()]);
    }

    #[test]
    fn test_update_compacts_timeline() {
        let reg = Registry::new(None);
        reg.insert(sample_swap("s1"));
        let (updated, _) = reg
            .update("s1", |s| {
                s.timeline.push(status::WAITING_DEPOSIT.into());
                s.timeline.push(status::WAITING_DEPOSIT.into());
            })
            .unwrap();
        assert_eq!(updated.timeline, vec![status::WAITING_DEPOSIT.to_string()]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let reg = Registry::open(path.clone()).unwrap();
        reg.insert(sample_swap("s1"));
        reg.update("s1", |s| s.received_xmr = dec!(0.65)).unwrap();

        // Fresh process: restore and resume
        let restored = Registry::open(path).unwrap();
        let swap = restored.get("s1").unwrap();
        assert_eq!(swap.received_xmr, dec!(0.65));
        assert!(!swap.leg2.created);
        assert_eq!(restored.non_terminal_ids().len(), 1);
    }

    #[test]
    fn test_snapshot_is_atomic_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let reg = Registry::open(path.clone()).unwrap();
        reg.insert(sample_swap("s1"));
        reg.insert(sample_swap("s2"));

        // No temp file left behind after a save
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = Registry::open(dir.path().join("absent.json")).unwrap();
        assert!(reg.all().is_empty());
    }
}
