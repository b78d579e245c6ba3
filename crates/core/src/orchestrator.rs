//! Core orchestrator — owns the provider modules, wallet, oracle, and
//! registry, and exposes the unified API the HTTP layer consumes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use veil_common::error::{VeilError, VeilResult};
use veil_common::traits::{PriceFeed, SwapProvider, WalletOps};
use veil_common::types::{ProviderId, QuoteRequest, StartSwapRequest, Swap};

use veil_mod_changenow::ChangeNowModule;
use veil_mod_exolix::ExolixModule;
use veil_mod_simpleswap::SimpleSwapModule;
use veil_mod_stealthex::StealthExModule;
use veil_wallet::WalletRpcClient;

use crate::config::Settings;
use crate::engine;
use crate::oracle::CoinGeckoOracle;
use crate::quote::{self, RankedRoutes};
use crate::registry::Registry;

/// The core orchestrator — everything the swap lifecycle needs, wired up.
pub struct Orchestrator {
    providers: HashMap<ProviderId, Arc<dyn SwapProvider>>,
    wallet: Arc<dyn WalletOps>,
    prices: Arc<dyn PriceFeed>,
    registry: Arc<Registry>,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(
        providers: HashMap<ProviderId, Arc<dyn SwapProvider>>,
        wallet: Arc<dyn WalletOps>,
        prices: Arc<dyn PriceFeed>,
        registry: Arc<Registry>,
        settings: Settings,
    ) -> Self {
        Self {
            providers,
            wallet,
            prices,
            registry,
            settings,
        }
    }

    /// Build the production wiring: all four provider modules, the wallet
    /// RPC client, the CoinGecko oracle, and the registry restored from
    /// its on-disk snapshot.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let registry = Arc::new(Registry::open(PathBuf::from(&settings.state_file))?);
        let wallet: Arc<dyn WalletOps> = Arc::new(WalletRpcClient::new(
            settings.wallet_rpc_url.clone(),
            settings.wallet_rpc_user.clone(),
            settings.wallet_rpc_pass.clone(),
        ));
        let prices: Arc<dyn PriceFeed> = Arc::new(CoinGeckoOracle::new());

        let mut providers: HashMap<ProviderId, Arc<dyn SwapProvider>> = HashMap::new();
        providers.insert(
            ProviderId::ChangeNow,
            Arc::new(ChangeNowModule::new(settings.changenow_api_key.clone())),
        );
        providers.insert(
            ProviderId::Exolix,
            Arc::new(ExolixModule::new(settings.exolix_api_key.clone())),
        );
        providers.insert(
            ProviderId::SimpleSwap,
            Arc::new(SimpleSwapModule::new(settings.simpleswap_api_key.clone())),
        );
        providers.insert(
            ProviderId::StealthEx,
            Arc::new(StealthExModule::new(
                settings.stealthex_api_key.clone(),
                prices.clone(),
                settings.stealthex_haircut,
            )),
        );
        info!(providers = providers.len(), "orchestrator wired");

        Ok(Self::new(providers, wallet, prices, registry, settings))
    }

    /// Provider by id.
    pub fn provider(&self, id: ProviderId) -> VeilResult<Arc<dyn SwapProvider>> {
        self.providers
            .get(&id)
            .cloned()
            .ok_or_else(|| VeilError::Validation(format!("provider not configured: {id}")))
    }

    /// Registered provider ids in stable order.
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.providers.contains_key(id))
            .collect()
    }

    pub fn wallet(&self) -> &Arc<dyn WalletOps> {
        &self.wallet
    }

    pub fn prices(&self) -> &Arc<dyn PriceFeed> {
        &self.prices
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ── Unified API ─────────────────────────────────────────────────

    /// Rank every viable route for a request.
    pub async fn quote(&self, req: &QuoteRequest) -> VeilResult<RankedRoutes> {
        quote::quote_routes(self, req).await
    }

    /// Start a swap off a chosen route.
    pub async fn start(&self, req: StartSwapRequest) -> VeilResult<Swap> {
        engine::start(self, req).await
    }

    /// Advance one swap and return its current record.
    pub async fn advance(&self, swap_id: &str) -> VeilResult<Swap> {
        engine::advance(self, swap_id).await
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::test_orchestrator;
    use veil_common::types::ProviderId;

    #[test]
    fn test_provider_ids_stable_order() {
        let (orch, _, _) = test_orchestrator();
        assert_eq!(
            orch.provider_ids(),
            vec![
                ProviderId::ChangeNow,
                ProviderId::Exolix,
                ProviderId::SimpleSwap
            ]
        );
    }

    #[test]
    fn test_unconfigured_provider_errors() {
        let (orch, _, _) = test_orchestrator();
        assert!(orch.provider(ProviderId::StealthEx).is_err());
    }
}
