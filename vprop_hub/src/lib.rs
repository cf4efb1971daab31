//! # vprop Hub Library
//!
//! Vehicle property hub: one transport to the vehicle endpoint, many domain
//! handlers, each property owned by exactly one handler.
//!
//! Handlers implement the `PropertyHandler` trait defined in
//! `vprop_common::vhal::handler`.
//!
//! # Module Structure
//!
//! - [`hub`] - `VehicleHub`: lifecycle, claim arbitration, event fan-out
//! - [`client`] - Transport client with TRY_AGAIN retry
//! - [`registry`] - Frozen property descriptor registry
//! - [`dispatch`] - Dispatch thread and its queue
//! - [`event_log`] - Last value and counters per property
//! - [`handler_registry`] - Handler factory registration
//! - [`handlers`] - Built-in domain handlers
//! - [`transports`] - Transport implementations
//! - [`commands`] - Diagnostic command table
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       vprop_hub (single crate)                    │
//! │  ┌──────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │  Transport   │───►│  Dispatch    │───►│  VehicleHub         │  │
//! │  │  Client      │    │  thread      │    │  (claims, subs)     │  │
//! │  └──────▲───────┘    └──────────────┘    └──────────┬──────────┘  │
//! │         │                                           │             │
//! │         │                                           ▼             │
//! │  ┌──────┴───────┐                          ┌────────────────┐     │
//! │  │  Vehicle     │                          │ PropertyHandler│     │
//! │  │  Transport   │ (trait object)           │ (trait objects)│     │
//! │  └──────────────┘                          └────────────────┘     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod commands;
pub mod dispatch;
pub mod event_log;
pub mod handler_registry;
pub mod handlers;
pub mod hub;
pub mod registry;
pub mod transports;

// Re-export key types for convenience
pub use crate::client::RetryPolicy;
pub use crate::handler_registry::HandlerRegistry;
pub use crate::hub::{HubState, SubscriptionEntry, VehicleHub};
pub use crate::registry::PropertyRegistry;
pub use crate::transports::simulation::SimulatedTransport;
