//! Application layer - Generic services that use ports.

// Command orchestration with settle-and-verify
pub mod control;

// Monitor supervision, fleet summary, discovery
pub mod fleet;

// Per-device polling observer
pub mod monitor;

// Reaction to error transitions
pub mod remediation;
