//! Cabin handler: doors, windows and mirrors.

use super::{HandlerLink, Listener};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HubContext, PropertyHandler};
use vprop_common::vhal::props::{DOOR_LOCK, DOOR_POS, MIRROR_FOLD, WINDOW_LOCK, WINDOW_POS};
use vprop_common::vhal::types::{
    AreaId, GLOBAL_AREA, PropId, PropertyDescriptor, PropertyId, PropertyValue, Value,
};

pub const NAME: &str = "cabin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CabinProperty {
    DoorPosition,
    DoorLock,
    WindowPosition,
    WindowLock,
    MirrorFold,
}

const ID_TABLE: &[(CabinProperty, PropertyId)] = &[
    (CabinProperty::DoorPosition, DOOR_POS),
    (CabinProperty::DoorLock, DOOR_LOCK),
    (CabinProperty::WindowPosition, WINDOW_POS),
    (CabinProperty::WindowLock, WINDOW_LOCK),
    (CabinProperty::MirrorFold, MIRROR_FOLD),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CabinState {
    Position(i32),
    Engaged(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CabinEvent {
    pub property: CabinProperty,
    pub area: AreaId,
    pub state: CabinState,
}

pub struct CabinHandler {
    link: HandlerLink<CabinProperty>,
    claimed: Vec<CabinProperty>,
    states: BTreeMap<(CabinProperty, AreaId), CabinState>,
    listener: Option<Listener<CabinEvent>>,
}

impl CabinHandler {
    pub fn new() -> Self {
        Self {
            link: HandlerLink::new(NAME, ID_TABLE),
            claimed: Vec::new(),
            states: BTreeMap::new(),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl FnMut(&CabinEvent) + Send + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn control(&self) -> CabinControl {
        CabinControl {
            link: self.link.clone(),
        }
    }

    fn translate(&self, value: &PropertyValue) -> Option<CabinEvent> {
        let property = self.link.manager_id(value.prop_id)?;
        let state = match property {
            CabinProperty::DoorPosition | CabinProperty::WindowPosition => {
                CabinState::Position(value.value.as_i32()?)
            }
            CabinProperty::DoorLock | CabinProperty::WindowLock | CabinProperty::MirrorFold => {
                CabinState::Engaged(value.value.as_bool()?)
            }
        };
        Some(CabinEvent {
            property,
            area: value.area_id,
            state,
        })
    }
}

impl Default for CabinHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyHandler for CabinHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn claim_properties(
        &mut self,
        offered: &[Arc<PropertyDescriptor>],
    ) -> Vec<Arc<PropertyDescriptor>> {
        let claimed = self.link.claim(offered);
        self.claimed = claimed
            .iter()
            .filter_map(|d| self.link.manager_id(d.id))
            .collect();
        claimed
    }

    fn on_init(&mut self, ctx: Arc<dyn HubContext>) {
        self.link.slot().attach(ctx);
    }

    fn on_release(&mut self) {
        self.link.slot().detach();
        self.listener = None;
        self.states.clear();
    }

    fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
        for value in &values {
            let Some(event) = self.translate(value) else {
                debug!("Untranslatable cabin value {value}");
                continue;
            };
            self.states.insert((event.property, event.area), event.state);
            if let Some(listener) = self.listener.as_mut() {
                listener(&event);
            }
        }
    }

    fn on_set_error(&mut self, prop_id: PropertyId, area_id: AreaId) {
        info!(prop = %PropId(prop_id), "Cabin set refused for area {area_id:#x}");
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "  claimed: {:?}", self.claimed)?;
        for ((property, area), state) in &self.states {
            writeln!(out, "  {property:?} area={area:#x} {state:?}")?;
        }
        Ok(())
    }
}

/// Door, window and mirror commands.
#[derive(Clone)]
pub struct CabinControl {
    link: HandlerLink<CabinProperty>,
}

impl CabinControl {
    pub fn lock_door(&self, door: AreaId, locked: bool) -> Result<(), VhalError> {
        self.link.set(CabinProperty::DoorLock, door, Value::Bool(locked))
    }

    pub fn move_window(&self, window: AreaId, position: i32) -> Result<(), VhalError> {
        self.link
            .set(CabinProperty::WindowPosition, window, Value::Int32(position))
    }

    pub fn lock_window(&self, window: AreaId, locked: bool) -> Result<(), VhalError> {
        self.link.set(CabinProperty::WindowLock, window, Value::Bool(locked))
    }

    pub fn fold_mirrors(&self, folded: bool) -> Result<(), VhalError> {
        self.link
            .set(CabinProperty::MirrorFold, GLOBAL_AREA, Value::Bool(folded))
    }

    pub fn is_door_locked(&self, door: AreaId) -> Result<bool, VhalError> {
        let value = self.link.get(CabinProperty::DoorLock, door)?;
        value
            .value
            .as_bool()
            .ok_or_else(|| VhalError::InvalidArgument(format!("unexpected lock state {}", value.value)))
    }
}

pub fn create() -> Box<dyn PropertyHandler> {
    Box::new(CabinHandler::new())
}
