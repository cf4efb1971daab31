//! Vehicle transport implementations.
//!
//! - [`simulation`] - Simulated endpoint for development and testing
//!
//! # Adding New Transports
//!
//! 1. Create a new submodule under `transports/`
//! 2. Implement `VehicleTransport` from `vprop_common::vhal::transport`
//! 3. Deliver callbacks outside any lock the transport's own calls take

pub mod simulation;
