//! Ports - Trait seams between the application layer and the edges.

// Device control seam (HTTP adapter, simulator)
pub mod device;

// Fleet registry seam
pub mod registry;
