//! Vendor handler.
//!
//! Owns every property in the vendor group. Vendor properties have no domain
//! model, so values are passed through untouched.

use super::{ContextSlot, Listener};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HubContext, PropertyHandler};
use vprop_common::vhal::props::is_vendor_property;
use vprop_common::vhal::types::{
    AreaId, PropId, PropertyDescriptor, PropertyId, PropertyValue, Value, elapsed_realtime_nanos,
};

pub const NAME: &str = "vendor";

type ValueCache = Arc<Mutex<BTreeMap<(PropertyId, AreaId), PropertyValue>>>;

pub struct VendorHandler {
    slot: ContextSlot,
    claimed: Vec<PropertyId>,
    latest: ValueCache,
    listener: Option<Listener<PropertyValue>>,
}

impl VendorHandler {
    pub fn new() -> Self {
        Self {
            slot: ContextSlot::default(),
            claimed: Vec::new(),
            latest: ValueCache::default(),
            listener: None,
        }
    }

    pub fn with_listener(
        mut self,
        listener: impl FnMut(&PropertyValue) + Send + 'static,
    ) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn control(&self) -> VendorControl {
        VendorControl {
            slot: self.slot.clone(),
            latest: self.latest.clone(),
        }
    }
}

impl Default for VendorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyHandler for VendorHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn claim_properties(
        &mut self,
        offered: &[Arc<PropertyDescriptor>],
    ) -> Vec<Arc<PropertyDescriptor>> {
        let claimed: Vec<_> = offered
            .iter()
            .filter(|d| is_vendor_property(d.id))
            .cloned()
            .collect();
        self.claimed = claimed.iter().map(|d| d.id).collect();
        claimed
    }

    fn on_init(&mut self, ctx: Arc<dyn HubContext>) {
        info!("{} vendor properties available", self.claimed.len());
        self.slot.attach(ctx);
    }

    fn on_release(&mut self) {
        self.slot.detach();
        self.listener = None;
        self.latest.lock().clear();
    }

    fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
        for value in values {
            if let Some(listener) = self.listener.as_mut() {
                listener(&value);
            }
            self.latest
                .lock()
                .insert((value.prop_id, value.area_id), value);
        }
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let ids: Vec<String> = self.claimed.iter().map(|id| PropId(*id).to_string()).collect();
        writeln!(out, "  claimed: [{}]", ids.join(", "))?;
        for value in self.latest.lock().values() {
            writeln!(out, "  {value}")?;
        }
        Ok(())
    }
}

/// Raw access to vendor properties.
#[derive(Clone)]
pub struct VendorControl {
    slot: ContextSlot,
    latest: ValueCache,
}

impl VendorControl {
    fn check(prop_id: PropertyId) -> Result<(), VhalError> {
        if is_vendor_property(prop_id) {
            Ok(())
        } else {
            Err(VhalError::InvalidArgument(format!(
                "{} is not a vendor property",
                PropId(prop_id)
            )))
        }
    }

    pub fn get(&self, prop_id: PropertyId, area_id: AreaId) -> Result<PropertyValue, VhalError> {
        Self::check(prop_id)?;
        self.slot
            .get(NAME)?
            .get_value(&PropertyValue::request(prop_id, area_id))
    }

    pub fn set(&self, prop_id: PropertyId, area_id: AreaId, value: Value) -> Result<(), VhalError> {
        Self::check(prop_id)?;
        let value = PropertyValue::new(prop_id, area_id, elapsed_realtime_nanos(), value);
        self.slot.get(NAME)?.set_value(&value)
    }

    /// Last value delivered for a property.
    pub fn latest(&self, prop_id: PropertyId, area_id: AreaId) -> Option<PropertyValue> {
        self.latest.lock().get(&(prop_id, area_id)).cloned()
    }
}

pub fn create() -> Box<dyn PropertyHandler> {
    Box::new(VendorHandler::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::FakeContext;
    use vprop_common::vhal::props::PERF_VEHICLE_SPEED;
    use vprop_common::vhal::types::{ChangeMode, PropertyAccess, ValueShape};

    const VENDOR_PROP: PropertyId = 0x2140_0101;

    #[test]
    fn claims_vendor_group_only() {
        let mut handler = VendorHandler::new();
        let claimed = handler.claim_properties(&[
            Arc::new(PropertyDescriptor::new(
                VENDOR_PROP,
                PropertyAccess::ReadWrite,
                ChangeMode::OnChange,
                ValueShape::Int32,
            )),
            Arc::new(PropertyDescriptor::new(
                PERF_VEHICLE_SPEED,
                PropertyAccess::Read,
                ChangeMode::Continuous,
                ValueShape::Float,
            )),
        ]);
        assert_eq!(claimed.len(), 1);
        assert_eq!(handler.claimed, vec![VENDOR_PROP]);
    }

    #[test]
    fn control_rejects_system_ids() {
        let mut handler = VendorHandler::new();
        handler.on_init(FakeContext::new());
        let control = handler.control();
        assert!(matches!(
            control.set(PERF_VEHICLE_SPEED, 0, Value::Float(1.0)),
            Err(VhalError::InvalidArgument(_))
        ));
        assert!(control.set(VENDOR_PROP, 0, Value::Int32(1)).is_ok());
    }

    #[test]
    fn passthrough_cache() {
        let mut handler = VendorHandler::new();
        let control = handler.control();
        handler.on_event_batch(vec![PropertyValue::new(VENDOR_PROP, 0, 9, Value::Int32(4))]);
        assert_eq!(control.latest(VENDOR_PROP, 0).unwrap().value, Value::Int32(4));
    }
}
