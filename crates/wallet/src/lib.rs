pub mod client;

pub use client::WalletRpcClient;
