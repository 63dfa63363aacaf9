//! Domain layer - Pure business logic.

// Parameter model and descriptor interpretation
pub mod param;

// Replicator command/state machine
pub mod replicator;

// Fleet records and snapshots
pub mod encoder;

// Health threshold evaluation
pub mod health;

// Stream settings validation
pub mod validation;
