//! Runtime settings, collected from environment variables.
//!
//! Provider credentials, the wallet RPC endpoint, and the handful of
//! tunables the engine exposes. Everything has a default except the
//! wallet endpoint, which points at a local daemon when unset.

use std::env;

use rust_decimal::Decimal;

use veil_common::constants::{
    default_fee_cap_ratio, default_send_fee_reserve, default_stealthex_haircut,
    DEFAULT_SWEEP_INTERVAL_SECS,
};

/// All recognized environment variables, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    // ── Provider credentials ──────────────────────────────────────────
    pub changenow_api_key: String,
    pub exolix_api_key: String,
    pub simpleswap_api_key: String,
    pub stealthex_api_key: String,

    // ── Wallet daemon ─────────────────────────────────────────────────
    pub wallet_rpc_url: String,
    pub wallet_rpc_user: Option<String>,
    pub wallet_rpc_pass: Option<String>,

    // ── Engine tunables ───────────────────────────────────────────────
    /// Ceiling on our fee as a fraction of leg-1 XMR (`OUR_FEE_MAX_RATIO`).
    pub fee_cap_ratio: Decimal,
    /// XMR withheld from every forward send (`XMR_SEND_FEE_RESERVE`).
    pub send_fee_reserve: Decimal,
    /// Seconds between sweeps (`SWEEP_INTERVAL_S`).
    pub sweep_interval_secs: u64,
    /// StealthEX mid-market haircut (`STEALTHEX_QUOTE_HAIRCUT`).
    pub stealthex_haircut: Decimal,

    // ── Process ───────────────────────────────────────────────────────
    /// Registry snapshot path (`VEIL_STATE_FILE`).
    pub state_file: String,
    /// HTTP listen address (`VEIL_LISTEN_ADDR`).
    pub listen_addr: String,
}

fn env_string(key: &str) -> String {
    env::var(key).unwrap_or_default().trim().to_string()
}

fn env_opt(key: &str) -> Option<String> {
    let v = env_string(key);
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

/// Parse a decimal override, falling back when unset or unparseable.
fn decimal_or(raw: Option<&str>, default: Decimal) -> Decimal {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn u64_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        let sweep = env::var("SWEEP_INTERVAL_S").ok();
        let fee_cap = env::var("OUR_FEE_MAX_RATIO").ok();
        let reserve = env::var("XMR_SEND_FEE_RESERVE").ok();
        let haircut = env::var("STEALTHEX_QUOTE_HAIRCUT").ok();

        Self {
            changenow_api_key: env_string("CHANGENOW_API_KEY"),
            exolix_api_key: env_string("EXOLIX_API_KEY"),
            simpleswap_api_key: env_string("SIMPLESWAP_API_KEY"),
            stealthex_api_key: env_string("STEALTHEX_API_KEY"),
            wallet_rpc_url: env_opt("XMR_WALLET_RPC_URL")
                .unwrap_or_else(|| "http://127.0.0.1:18083/json_rpc".into()),
            wallet_rpc_user: env_opt("XMR_WALLET_RPC_USER"),
            wallet_rpc_pass: env_opt("XMR_WALLET_RPC_PASS"),
            fee_cap_ratio: decimal_or(fee_cap.as_deref(), default_fee_cap_ratio()),
            send_fee_reserve: decimal_or(reserve.as_deref(), default_send_fee_reserve()),
            sweep_interval_secs: u64_or(sweep.as_deref(), DEFAULT_SWEEP_INTERVAL_SECS),
            stealthex_haircut: decimal_or(haircut.as_deref(), default_stealthex_haircut()),
            state_file: env_opt("VEIL_STATE_FILE").unwrap_or_else(|| "veil-state.json".into()),
            listen_addr: env_opt("VEIL_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            changenow_api_key: String::new(),
            exolix_api_key: String::new(),
            simpleswap_api_key: String::new(),
            stealthex_api_key: String::new(),
            wallet_rpc_url: "http://127.0.0.1:18083/json_rpc".into(),
            wallet_rpc_user: None,
            wallet_rpc_pass: None,
            fee_cap_ratio: default_fee_cap_ratio(),
            send_fee_reserve: default_send_fee_reserve(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            stealthex_haircut: default_stealthex_haircut(),
            state_file: "veil-state.json".into(),
            listen_addr: "0.0.0.0:8080".into(),
        }
    }
}
