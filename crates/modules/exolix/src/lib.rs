pub mod client;

pub use client::ExolixModule;
