pub mod client;

pub use client::SimpleSwapModule;
