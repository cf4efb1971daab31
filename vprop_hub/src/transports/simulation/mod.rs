//! Simulation transport module.
//!
//! A software vehicle endpoint backed by `properties.toml`, for development
//! and testing without a vehicle bus.

mod store;
mod transport;

pub use store::ValueStore;
pub use transport::{SimulatedTransport, TransportStats};
