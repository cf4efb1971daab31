//! Error type shared by the transport client, the hub and the handlers.

use crate::vhal::transport::StatusCode;
use crate::vhal::types::{PropId, PropertyId};
use thiserror::Error;

fn hex(id: &PropertyId) -> PropId {
    PropId(*id)
}

/// Error types for vehicle property operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VhalError {
    /// The transport could not be reached. Fatal during hub initialization.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// A synchronous call kept receiving TRY_AGAIN until the retry budget ran out.
    #[error("Timed out waiting for property {}", hex(.0))]
    PropertyTimeout(PropertyId),

    /// The property is unknown to the transport or the registry.
    #[error("Invalid property {}", hex(.0))]
    InvalidProperty(PropertyId),

    /// The request is malformed for the addressed property.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport returned a non-success status.
    #[error("Transport error: {0:?}")]
    TransportError(StatusCode),

    /// The property cannot be subscribed (write-only or static).
    #[error("Property {} is not subscribable", hex(.0))]
    NotSubscribable(PropertyId),

    /// The transport reported the same property twice.
    #[error("Duplicate property {} in transport configuration", hex(.0))]
    DuplicateProperty(PropertyId),

    /// The transport reported a descriptor that cannot be used.
    #[error("Invalid descriptor for property {}: {reason}", hex(.prop_id))]
    InvalidDescriptor { prop_id: PropertyId, reason: String },

    /// A handler addressed a property claimed by someone else.
    #[error("Property {} is not owned by handler '{handler}'", hex(.prop_id))]
    NotOwned {
        prop_id: PropertyId,
        handler: &'static str,
    },

    /// The operation is not allowed in the current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl VhalError {
    /// True for errors a synchronous caller may retry later.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::TransportUnavailable(_)
                | Self::DuplicateProperty(_)
                | Self::InvalidDescriptor { .. }
                | Self::ConfigError(_)
        )
    }
}
