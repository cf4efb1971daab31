//! Prelude module for common re-exports.
//!
//! ```rust
//! use vprop_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::vhal::config::{HubConfig, PropertyTable, RetryConfig};

// ─── Data model ─────────────────────────────────────────────────────
pub use crate::vhal::types::{
    AreaConfig, AreaId, ChangeMode, GLOBAL_AREA, PropId, PropertyAccess, PropertyDescriptor,
    PropertyId, PropertyValue, RawValue, SubscribeFlags, Value, ValueShape,
};

// ─── Contracts ──────────────────────────────────────────────────────
pub use crate::bimap::IdBimap;
pub use crate::vhal::error::VhalError;
pub use crate::vhal::handler::{HandlerFactory, HubContext, PropertyHandler};
pub use crate::vhal::transport::{
    StatusCode, SubscribeOptions, TransportCallback, VehicleTransport,
};
