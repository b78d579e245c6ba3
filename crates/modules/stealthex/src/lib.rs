pub mod client;

pub use client::StealthExModule;
