//! Universal error types for Veil.

use thiserror::Error;

/// Top-level error type for all Veil operations.
///
/// Quote absence is NOT an error: providers that cannot serve a pair
/// report a zero estimate and the route is simply hidden. Errors here are
/// the cases a caller must react to.
#[derive(Debug, Error)]
pub enum VeilError {
    /// Provider-specific failure outside the create path.
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// No route produced a positive receive amount.
    #[error("no provider returned a usable quote")]
    NoQuote,

    /// Non-2xx or empty deposit address on order creation.
    #[error("Provider create failed ({provider}): {message}")]
    ProviderCreateFailed { provider: String, message: String },

    /// Any failure of a wallet JSON-RPC call.
    #[error("Wallet RPC error: {0}")]
    WalletRpc(String),

    /// The forward transfer itself failed.
    #[error("Wallet send failed: {0}")]
    WalletSend(String),

    #[error("Unknown swap: {0}")]
    UnknownSwap(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

pub type VeilResult<T> = Result<T, VeilError>;
