//! In-memory fakes for the provider, wallet, and price contracts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use veil_common::error::{VeilError, VeilResult};
use veil_common::traits::{
    CreateOrderRequest, CreatedOrder, Estimate, EstimateRequest, OrderInfo, PriceFeed,
    SwapProvider, WalletOps,
};
use veil_common::types::{Asset, PriceTable, ProviderId, SubAddress};

use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::registry::Registry;

/// Default leg-1 output (input → XMR) of every mock provider. Chosen just
/// under the fallback-price mid-market for 0.01 BTC (3.75 XMR) so the
/// spread fee stays below the cap.
pub const LEG1_XMR: Decimal = dec!(3.70);

/// Default leg-2 output (XMR → output asset).
pub const LEG2_OUT: Decimal = dec!(2.5);

// ── Provider fake ───────────────────────────────────────────────────

pub struct MockProvider {
    id: ProviderId,
    leg1_out: Mutex<Decimal>,
    leg2_out: Mutex<Decimal>,
    info_status: Mutex<String>,
    fail_create: AtomicBool,
    create_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: ProviderId) -> Arc<Self> {
        Arc::new(Self {
            id,
            leg1_out: Mutex::new(LEG1_XMR),
            leg2_out: Mutex::new(LEG2_OUT),
            info_status: Mutex::new(String::new()),
            fail_create: AtomicBool::new(false),
            create_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_leg1_out(&self, v: Decimal) {
        *self.leg1_out.lock().unwrap() = v;
    }

    pub fn set_leg2_out(&self, v: Decimal) {
        *self.leg2_out.lock().unwrap() = v;
    }

    pub fn set_info_status(&self, s: &str) {
        *self.info_status.lock().unwrap() = s.to_string();
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn unfail_create(&self) {
        self.fail_create.store(false, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwapProvider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn estimate(&self, req: &EstimateRequest) -> Estimate {
        let to_amount = if req.to_asset == Asset::Xmr {
            *self.leg1_out.lock().unwrap()
        } else {
            *self.leg2_out.lock().unwrap()
        };
        if to_amount <= Decimal::ZERO {
            return Estimate::zero();
        }
        Estimate {
            to_amount,
            raw: serde_json::json!({"mock": self.id.to_string()}),
        }
    }

    async fn create(&self, _req: &CreateOrderRequest) -> VeilResult<CreatedOrder> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(VeilError::ProviderCreateFailed {
                provider: self.id.to_string(),
                message: "mock create failure".into(),
            });
        }
        Ok(CreatedOrder {
            order_id: format!("{}-order-{n}", self.id),
            deposit_address: format!("{}-deposit-{n}", self.id),
            deposit_extra: None,
            raw: serde_json::json!({"mock": true}),
        })
    }

    async fn info(&self, _order_id: &str) -> VeilResult<OrderInfo> {
        let status_text = self.info_status.lock().unwrap().clone();
        Ok(OrderInfo {
            raw: serde_json::json!({"status": status_text}),
            status_text,
        })
    }
}

// ── Wallet fake ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockWallet {
    subaddr_counter: AtomicU32,
    received: Mutex<HashMap<u32, Decimal>>,
    unlocked: Mutex<Decimal>,
    transfers: Mutex<Vec<(String, Decimal)>>,
    pub fail_transfers: AtomicBool,
}

impl MockWallet {
    pub fn set_received(&self, index: u32, amount: Decimal) {
        self.received.lock().unwrap().insert(index, amount);
    }

    pub fn set_unlocked(&self, amount: Decimal) {
        *self.unlocked.lock().unwrap() = amount;
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.lock().unwrap().len()
    }

    pub fn last_transfer_amount(&self) -> Option<Decimal> {
        self.transfers.lock().unwrap().last().map(|(_, a)| *a)
    }

    pub fn subaddress_count(&self) -> u32 {
        self.subaddr_counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletOps for MockWallet {
    async fn create_subaddress(&self, label: &str) -> VeilResult<SubAddress> {
        let index = self.subaddr_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SubAddress {
            address: format!("sub-{label}-{index}"),
            index,
        })
    }

    async fn sum_received(&self, subaddr_index: u32) -> Decimal {
        self.received
            .lock()
            .unwrap()
            .get(&subaddr_index)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    async fn unlocked_balance(&self) -> VeilResult<Decimal> {
        Ok(*self.unlocked.lock().unwrap())
    }

    async fn transfer(&self, dest_address: &str, amount_xmr: Decimal) -> VeilResult<String> {
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(VeilError::WalletSend("mock wallet busy".into()));
        }
        let mut transfers = self.transfers.lock().unwrap();
        transfers.push((dest_address.to_string(), amount_xmr));
        Ok(format!("txid-{}", transfers.len()))
    }
}

// ── Price fake ──────────────────────────────────────────────────────

pub struct FallbackPrices;

#[async_trait]
impl PriceFeed for FallbackPrices {
    async fn usd_prices(&self) -> PriceTable {
        PriceTable::fallback()
    }
}

// ── Wiring ──────────────────────────────────────────────────────────

/// Orchestrator over three mock providers, a mock wallet, fallback
/// prices, and a memory-only registry.
pub fn test_orchestrator() -> (
    Orchestrator,
    Arc<MockWallet>,
    HashMap<ProviderId, Arc<MockProvider>>,
) {
    test_orchestrator_with_registry(Arc::new(Registry::new(None)))
}

/// Same wiring over a caller-supplied registry (restart tests).
pub fn test_orchestrator_with_registry(
    registry: Arc<Registry>,
) -> (
    Orchestrator,
    Arc<MockWallet>,
    HashMap<ProviderId, Arc<MockProvider>>,
) {
    let wallet = Arc::new(MockWallet::default());
    let mut mocks = HashMap::new();
    let mut providers: HashMap<ProviderId, Arc<dyn SwapProvider>> = HashMap::new();
    for id in [
        ProviderId::ChangeNow,
        ProviderId::Exolix,
        ProviderId::SimpleSwap,
    ] {
        let mock = MockProvider::new(id);
        providers.insert(id, mock.clone());
        mocks.insert(id, mock);
    }

    let orch = Orchestrator::new(
        providers,
        wallet.clone(),
        Arc::new(FallbackPrices),
        registry,
        Settings::default(),
    );
    (orch, wallet, mocks)
}
