//! Helofleet - Control and fleet monitoring for AJA HELO encoders
//!
//! The HELO is a hardware H.264 encoder/streamer driven over an HTTP
//! parameter get/set API. This crate polls a fleet of them, interprets
//! their enumerated states through device-served descriptors, verifies
//! commanded state changes, and reacts to failures.
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (params, replicator states, health, validation)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations (HTTP client, simulator, registry, API facade)
//! - application/: Generic services (control, monitor, fleet, remediation)
//! - events/: State-transition broadcast
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod events;
pub mod ports;

// Re-exports for convenience
pub use adapters::helo::{HeloConnector, HeloDevice, RetryPolicy};
pub use config::{FleetConfig, SimConfig};
pub use events::hub::EventHub;
