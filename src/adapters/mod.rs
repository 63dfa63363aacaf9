//! Adapters - Concrete implementations of ports.

// Operator HTTP facade
pub mod api;

// Outbound HTTP client for real devices
pub mod helo;

// In-memory registry
pub mod memory;

// Simulated device
pub mod sim;
