//! Domain handlers.
//!
//! Each handler translates between packed vehicle property ids and its own
//! domain ids through an [`IdBimap`], converts generic values into a domain
//! type, and forwards them to an optional listener. Handlers that accept
//! commands hand out a small control handle sharing their hub context.
//!
//! # Built-in handlers (canonical priority order)
//!
//! | Name | Properties |
//! |------|------------|
//! | `power` | AP power state request/report, display brightness |
//! | `sensor` | speed, rpm, odometer, fuel, gear, parking brake, night mode, ignition |
//! | `input` | hardware key events |
//! | `audio` | focus, volume, volume limit |
//! | `hvac` | fan speed, temperature, AC, power |
//! | `cabin` | doors, windows, mirrors |
//! | `radio` | presets |
//! | `diagnostic` | OBD2 live/freeze frames |
//! | `vendor` | every vendor-group property |

pub mod audio;
pub mod cabin;
pub mod diagnostic;
pub mod hvac;
pub mod input;
pub mod power;
pub mod radio;
pub mod sensor;
pub mod vendor;

use parking_lot::RwLock;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::warn;
use vprop_common::bimap::IdBimap;
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HandlerFactory, HubContext};
use vprop_common::vhal::props::value_shape_of;
use vprop_common::vhal::types::{
    AreaId, PropId, PropertyDescriptor, PropertyId, PropertyValue, SubscribeFlags, Value,
    elapsed_realtime_nanos,
};

/// Every built-in handler with its factory.
pub const BUILTIN_HANDLERS: &[(&str, HandlerFactory)] = &[
    (power::NAME, power::create),
    (sensor::NAME, sensor::create),
    (input::NAME, input::create),
    (audio::NAME, audio::create),
    (hvac::NAME, hvac::create),
    (cabin::NAME, cabin::create),
    (radio::NAME, radio::create),
    (diagnostic::NAME, diagnostic::create),
    (vendor::NAME, vendor::create),
];

/// Domain-level callback of one handler. Dropped on release.
pub type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// Claim every offered descriptor present on the hal side of `map`.
///
/// A descriptor whose declared shape disagrees with the shape encoded in its
/// id cannot be translated and is left for later handlers.
pub fn claim_mapped<M>(
    handler: &'static str,
    map: &IdBimap<M, PropertyId>,
    offered: &[Arc<PropertyDescriptor>],
) -> Vec<Arc<PropertyDescriptor>>
where
    M: Copy + Eq + Hash + Debug,
{
    offered
        .iter()
        .filter(|d| map.contains_hal(d.id))
        .filter(|d| match value_shape_of(d.id) {
            Some(encoded) if encoded != d.shape => {
                warn!(
                    handler,
                    prop = %PropId(d.id),
                    "Declared shape {} disagrees with id encoding {encoded}, not claimed",
                    d.shape
                );
                false
            }
            _ => true,
        })
        .cloned()
        .collect()
}

/// Hub context shared between a handler and its control handles.
///
/// Attached in `on_init`, detached in `on_release`.
#[derive(Clone, Default)]
pub struct ContextSlot {
    ctx: Arc<RwLock<Option<Arc<dyn HubContext>>>>,
}

impl ContextSlot {
    pub fn attach(&self, ctx: Arc<dyn HubContext>) {
        *self.ctx.write() = Some(ctx);
    }

    pub fn detach(&self) {
        self.ctx.write().take();
    }

    pub fn is_attached(&self) -> bool {
        self.ctx.read().is_some()
    }

    /// Current context.
    ///
    /// # Errors
    /// Returns `VhalError::InvalidState` before `on_init` and after release.
    pub fn get(&self, handler: &'static str) -> Result<Arc<dyn HubContext>, VhalError> {
        self.ctx
            .read()
            .clone()
            .ok_or_else(|| VhalError::InvalidState(format!("handler '{handler}' is not initialized")))
    }
}

/// Id table and hub context of one handler, cloned into its control handles.
pub struct HandlerLink<M> {
    name: &'static str,
    map: Arc<IdBimap<M, PropertyId>>,
    slot: ContextSlot,
}

impl<M> Clone for HandlerLink<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            map: self.map.clone(),
            slot: self.slot.clone(),
        }
    }
}

impl<M> HandlerLink<M>
where
    M: Copy + Eq + Hash + Debug,
{
    /// # Panics
    /// Panics if `table` repeats an id on either side.
    pub fn new(name: &'static str, table: &[(M, PropertyId)]) -> Self {
        Self {
            name,
            map: Arc::new(IdBimap::from_pairs(table)),
            slot: ContextSlot::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn map(&self) -> &IdBimap<M, PropertyId> {
        &self.map
    }

    pub fn slot(&self) -> &ContextSlot {
        &self.slot
    }

    pub fn claim(&self, offered: &[Arc<PropertyDescriptor>]) -> Vec<Arc<PropertyDescriptor>> {
        claim_mapped(self.name, &self.map, offered)
    }

    /// Domain id of a hal property.
    pub fn manager_id(&self, prop_id: PropertyId) -> Option<M> {
        self.map.manager_id(prop_id)
    }

    fn hal_id(&self, id: M) -> Result<PropertyId, VhalError> {
        self.map.hal_id(id).ok_or_else(|| {
            VhalError::InvalidArgument(format!("{} has no property for {id:?}", self.name))
        })
    }

    /// Synchronous read of a domain property.
    pub fn get(&self, id: M, area_id: AreaId) -> Result<PropertyValue, VhalError> {
        let prop_id = self.hal_id(id)?;
        self.slot
            .get(self.name)?
            .get_value(&PropertyValue::request(prop_id, area_id))
    }

    /// Synchronous read carrying request parameters in the payload.
    pub fn query(&self, id: M, area_id: AreaId, params: Value) -> Result<PropertyValue, VhalError> {
        let prop_id = self.hal_id(id)?;
        let request = PropertyValue::new(prop_id, area_id, elapsed_realtime_nanos(), params);
        self.slot.get(self.name)?.get_value(&request)
    }

    /// Synchronous write of a domain property.
    pub fn set(&self, id: M, area_id: AreaId, value: Value) -> Result<(), VhalError> {
        let prop_id = self.hal_id(id)?;
        let value = PropertyValue::new(prop_id, area_id, elapsed_realtime_nanos(), value);
        self.slot.get(self.name)?.set_value(&value)
    }

    /// Descriptor of a domain property, once attached.
    pub fn descriptor(&self, id: M) -> Option<Arc<PropertyDescriptor>> {
        let prop_id = self.map.hal_id(id)?;
        self.slot.get(self.name).ok()?.descriptor(prop_id)
    }

    /// Change the subscription rate of a domain property.
    pub fn subscribe(&self, id: M, sample_rate_hz: f32) -> Result<(), VhalError> {
        let prop_id = self.hal_id(id)?;
        self.slot
            .get(self.name)?
            .subscribe(prop_id, sample_rate_hz, SubscribeFlags::default())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use vprop_common::vhal::props::{PERF_VEHICLE_SPEED, PARKING_BRAKE_ON};
    use vprop_common::vhal::types::{ChangeMode, PropertyAccess, ValueShape};

    fn desc(id: PropertyId, shape: ValueShape) -> Arc<PropertyDescriptor> {
        Arc::new(PropertyDescriptor::new(
            id,
            PropertyAccess::Read,
            ChangeMode::OnChange,
            shape,
        ))
    }

    #[test]
    fn claim_mapped_skips_unknown_and_mismatched() {
        let map: IdBimap<u8, PropertyId> =
            IdBimap::from_pairs(&[(1, PERF_VEHICLE_SPEED), (2, PARKING_BRAKE_ON)]);
        let offered = vec![
            desc(PERF_VEHICLE_SPEED, ValueShape::Float),
            desc(PARKING_BRAKE_ON, ValueShape::Int32),
            desc(0x1140_0001, ValueShape::Int32),
        ];
        let claimed = claim_mapped("test", &map, &offered);
        let ids: Vec<_> = claimed.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![PERF_VEHICLE_SPEED]);
    }

    #[test]
    fn builtin_names_are_unique() {
        let mut names: Vec<_> = BUILTIN_HANDLERS.iter().map(|(n, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BUILTIN_HANDLERS.len());
    }

    #[test]
    fn context_slot_lifecycle() {
        let slot = ContextSlot::default();
        assert!(matches!(slot.get("x"), Err(VhalError::InvalidState(_))));
        slot.attach(test_support::FakeContext::new());
        assert!(slot.is_attached());
        assert!(slot.get("x").is_ok());
        slot.detach();
        assert!(!slot.is_attached());
    }
}
