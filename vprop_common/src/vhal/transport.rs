//! Transport boundary.
//!
//! This module defines:
//! - `StatusCode` - Status values returned by the vehicle endpoint
//! - `VehicleTransport` trait - The opaque request/response channel
//! - `TransportCallback` trait - The three asynchronous delivery shapes
//!
//! The wire format behind a transport is a black box to the hub.

use crate::vhal::types::{AreaId, PropertyDescriptor, PropertyId, PropertyValue, SubscribeFlags};
use std::sync::Arc;

/// Status returned by the vehicle endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    /// Endpoint is busy or not ready; the same request may succeed later.
    TryAgain,
    /// The request does not address a valid property or area.
    InvalidArg,
    NotAvailable,
    AccessDenied,
    InternalError,
}

impl StatusCode {
    /// Numeric value used on the wire and in logs.
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::TryAgain => 1,
            Self::InvalidArg => 2,
            Self::NotAvailable => 3,
            Self::AccessDenied => 4,
            Self::InternalError => 5,
        }
    }

    /// Parse a wire status. Unknown codes fall into `InternalError`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::TryAgain,
            2 => Self::InvalidArg,
            3 => Self::NotAvailable,
            4 => Self::AccessDenied,
            _ => Self::InternalError,
        }
    }
}

/// One entry of a subscribe request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscribeOptions {
    pub prop_id: PropertyId,
    pub sample_rate_hz: f32,
    pub flags: SubscribeFlags,
}

/// Asynchronous deliveries from the vehicle endpoint.
///
/// Implementations must return promptly: they run on the transport's own thread.
pub trait TransportCallback: Send + Sync {
    /// One or more property values changed.
    fn on_values_changed(&self, values: Vec<PropertyValue>);

    /// A set call was applied.
    fn on_value_set_ack(&self, value: PropertyValue);

    /// A set call failed after it was accepted.
    fn on_value_set_error(&self, status: StatusCode, prop_id: PropertyId, area_id: AreaId);
}

/// Opaque request/response channel to the vehicle endpoint.
///
/// Implementations must be callable from several threads at once.
pub trait VehicleTransport: Send + Sync {
    /// Install the callback receiving asynchronous deliveries.
    /// Replaces any previously installed callback.
    fn set_callback(&self, callback: Arc<dyn TransportCallback>);

    /// Fetch every property descriptor the endpoint supports.
    fn fetch_all_descriptors(&self) -> Result<Vec<PropertyDescriptor>, StatusCode>;

    /// Read one value. Only `prop_id` and `area_id` of the request are meaningful.
    fn get(&self, request: &PropertyValue) -> Result<PropertyValue, StatusCode>;

    /// Write one value.
    fn set(&self, value: &PropertyValue) -> StatusCode;

    /// Start (or update) event delivery for the given properties.
    fn subscribe(&self, options: &[SubscribeOptions]) -> StatusCode;

    /// Stop event delivery for one property.
    fn unsubscribe(&self, prop_id: PropertyId) -> StatusCode;
}
