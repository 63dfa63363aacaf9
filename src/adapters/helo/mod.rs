//! Outbound HTTP adapter for real HELO hardware.

pub mod client;
pub mod retry;

pub use client::{HeloConnector, HeloDevice};
pub use retry::RetryPolicy;
