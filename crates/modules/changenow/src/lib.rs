pub mod client;

pub use client::ChangeNowModule;
