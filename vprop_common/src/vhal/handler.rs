//! Handler base contract.
//!
//! This module defines:
//! - `PropertyHandler` trait - Interface every domain handler implements
//! - `HubContext` trait - What the hub offers a handler after init
//!
//! # Lifecycle
//!
//! 1. `claim_properties()` - Called once with the descriptors nobody claimed yet
//! 2. `on_init()` - Called once, after every claimed property was subscribed
//! 3. `on_event_batch()` / `on_set_error()` - Called on the hub's dispatch thread
//! 4. `on_release()` - Called in reverse priority order; may be called again
//!
//! # Threading
//!
//! | Callback | Thread |
//! |----------|--------|
//! | `claim_properties()`, `on_init()` | caller of hub init |
//! | `on_event_batch()`, `on_set_error()` | dispatch thread |
//! | `on_release()` | caller of hub release |
//!
//! Deliveries are serialized: no two callbacks of one hub run at the same time
//! on the dispatch thread. A slow handler stalls every later delivery.

use crate::vhal::error::VhalError;
use crate::vhal::types::{AreaId, PropertyDescriptor, PropertyId, PropertyValue, SubscribeFlags};
use std::fmt;
use std::sync::Arc;

/// Services the hub exposes to one handler.
///
/// Subscriptions made through a context are checked against the claims of
/// the handler the context was issued to.
pub trait HubContext: Send + Sync {
    /// Subscribe (or change the rate of) a claimed property.
    fn subscribe(
        &self,
        prop_id: PropertyId,
        sample_rate_hz: f32,
        flags: SubscribeFlags,
    ) -> Result<(), VhalError>;

    /// Stop receiving events for a claimed property.
    fn unsubscribe(&self, prop_id: PropertyId) -> Result<(), VhalError>;

    /// Synchronous read through the transport client.
    fn get_value(&self, request: &PropertyValue) -> Result<PropertyValue, VhalError>;

    /// Synchronous write through the transport client.
    fn set_value(&self, value: &PropertyValue) -> Result<(), VhalError>;

    /// Descriptor of any known property.
    fn descriptor(&self, prop_id: PropertyId) -> Option<Arc<PropertyDescriptor>>;
}

/// Trait implemented by every domain handler.
pub trait PropertyHandler: Send {
    /// Unique handler name, used in logs, dumps and config.
    fn name(&self) -> &'static str;

    /// Pick the properties this handler owns out of `offered`.
    ///
    /// Claims are all-or-nothing per property: return a descriptor only if the
    /// handler can translate it. Ids that were not offered are ignored by the hub.
    fn claim_properties(
        &mut self,
        offered: &[Arc<PropertyDescriptor>],
    ) -> Vec<Arc<PropertyDescriptor>>;

    /// Called once after the claims were recorded and subscribed.
    fn on_init(&mut self, ctx: Arc<dyn HubContext>);

    /// Drop listeners and cached state. Must be idempotent.
    fn on_release(&mut self);

    /// Values of claimed properties, in transport arrival order.
    fn on_event_batch(&mut self, values: Vec<PropertyValue>);

    /// The transport rejected a set call for a claimed property.
    fn on_set_error(&mut self, _prop_id: PropertyId, _area_id: AreaId) {
        // Default: ignore
    }

    /// Human-readable diagnostic state. No side effects.
    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result;
}

/// Factory function creating a handler instance.
pub type HandlerFactory = fn() -> Box<dyn PropertyHandler>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vhal::types::{ChangeMode, PropertyAccess, ValueShape};

    struct TestHandler {
        claimed: Vec<PropertyId>,
        received: usize,
        released: bool,
    }

    impl PropertyHandler for TestHandler {
        fn name(&self) -> &'static str {
            "test"
        }

        fn claim_properties(
            &mut self,
            offered: &[Arc<PropertyDescriptor>],
        ) -> Vec<Arc<PropertyDescriptor>> {
            let claimed: Vec<_> = offered
                .iter()
                .filter(|d| d.shape == ValueShape::Bool)
                .cloned()
                .collect();
            self.claimed = claimed.iter().map(|d| d.id).collect();
            claimed
        }

        fn on_init(&mut self, _ctx: Arc<dyn HubContext>) {}

        fn on_release(&mut self) {
            self.released = true;
        }

        fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
            self.received += values.len();
        }

        fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
            writeln!(out, "test: claimed={:?} received={}", self.claimed, self.received)
        }
    }

    #[test]
    fn claim_filters_offered_set() {
        let mut handler = TestHandler {
            claimed: Vec::new(),
            received: 0,
            released: false,
        };
        let offered = vec![
            Arc::new(PropertyDescriptor::new(
                1,
                PropertyAccess::Read,
                ChangeMode::OnChange,
                ValueShape::Bool,
            )),
            Arc::new(PropertyDescriptor::new(
                2,
                PropertyAccess::Read,
                ChangeMode::OnChange,
                ValueShape::Int32,
            )),
        ];
        let claimed = handler.claim_properties(&offered);
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, 1);

        handler.on_set_error(1, 0);
        handler.on_release();
        handler.on_release();
        assert!(handler.released);

        let mut text = String::new();
        handler.dump(&mut text).unwrap();
        assert!(text.contains("claimed=[1]"));
    }
}
