//! Power handler.
//!
//! Tracks AP power state requests from the vehicle, reports the head unit's
//! power state back, and owns display brightness.

use super::{HandlerLink, Listener};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HubContext, PropertyHandler};
use vprop_common::vhal::props::{AP_POWER_STATE_REPORT, AP_POWER_STATE_REQ, DISPLAY_BRIGHTNESS};
use vprop_common::vhal::types::{
    AreaId, GLOBAL_AREA, PropId, PropertyDescriptor, PropertyId, PropertyValue, Value,
};

pub const NAME: &str = "power";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerProperty {
    StateRequest,
    StateReport,
    DisplayBrightness,
}

const ID_TABLE: &[(PowerProperty, PropertyId)] = &[
    (PowerProperty::StateRequest, AP_POWER_STATE_REQ),
    (PowerProperty::StateReport, AP_POWER_STATE_REPORT),
    (PowerProperty::DisplayBrightness, DISPLAY_BRIGHTNESS),
];

/// Power state requested by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerStateRequest {
    On,
    ShutdownPrepare,
    CancelShutdown,
    Finished,
}

impl PowerStateRequest {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::On),
            1 => Some(Self::ShutdownPrepare),
            2 => Some(Self::CancelShutdown),
            3 => Some(Self::Finished),
            _ => None,
        }
    }
}

/// Power state reported by the head unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PowerStateReport {
    WaitForVhal = 1,
    DeepSleepEntry = 2,
    DeepSleepExit = 3,
    ShutdownPostpone = 4,
    ShutdownStart = 5,
    On = 6,
    ShutdownPrepare = 7,
    ShutdownCancelled = 8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PowerEvent {
    StateRequest { state: PowerStateRequest, param: i32 },
    Brightness(i32),
}

pub struct PowerHandler {
    link: HandlerLink<PowerProperty>,
    claimed: Vec<PowerProperty>,
    last_request: Option<(PowerStateRequest, i32)>,
    brightness: Option<i32>,
    listener: Option<Listener<PowerEvent>>,
}

impl PowerHandler {
    pub fn new() -> Self {
        Self {
            link: HandlerLink::new(NAME, ID_TABLE),
            claimed: Vec::new(),
            last_request: None,
            brightness: None,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl FnMut(&PowerEvent) + Send + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn control(&self) -> PowerControl {
        PowerControl {
            link: self.link.clone(),
        }
    }

    fn translate(&self, value: &PropertyValue) -> Option<PowerEvent> {
        match self.link.manager_id(value.prop_id)? {
            PowerProperty::StateRequest => {
                let raw = value.value.as_i32_slice()?;
                let state = PowerStateRequest::from_code(*raw.first()?)?;
                let param = raw.get(1).copied().unwrap_or(0);
                Some(PowerEvent::StateRequest { state, param })
            }
            PowerProperty::DisplayBrightness => value.value.as_i32().map(PowerEvent::Brightness),
            // Written by us, echoes carry nothing new.
            PowerProperty::StateReport => None,
        }
    }
}

impl Default for PowerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyHandler for PowerHandler {
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
        if let Err(e) = self
            .control()
            .report_state(PowerStateReport::WaitForVhal, 0)
        {
            debug!("Initial power state report skipped: {e}");
        }
    }

    fn on_release(&mut self) {
        self.link.slot().detach();
        self.listener = None;
    }

    fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
        for value in &values {
            let Some(event) = self.translate(value) else {
                continue;
            };
            match &event {
                PowerEvent::StateRequest { state, param } => {
                    info!("Power state request {state:?} (param {param})");
                    self.last_request = Some((*state, *param));
                }
                PowerEvent::Brightness(level) => self.brightness = Some(*level),
            }
            if let Some(listener) = self.listener.as_mut() {
                listener(&event);
            }
        }
    }

    fn on_set_error(&mut self, prop_id: PropertyId, area_id: AreaId) {
        warn!(prop = %PropId(prop_id), "Power property set failed for area {area_id:#x}");
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "  claimed: {:?}", self.claimed)?;
        writeln!(out, "  last request: {:?}", self.last_request)?;
        writeln!(out, "  brightness: {:?}", self.brightness)
    }
}

/// Commands towards the vehicle power controller.
#[derive(Clone)]
pub struct PowerControl {
    link: HandlerLink<PowerProperty>,
}

impl PowerControl {
    pub fn report_state(&self, report: PowerStateReport, param: i32) -> Result<(), VhalError> {
        self.link.set(
            PowerProperty::StateReport,
            GLOBAL_AREA,
            Value::Int32Vec(vec![report as i32, param]),
        )
    }

    pub fn set_display_brightness(&self, level: i32) -> Result<(), VhalError> {
        self.link
            .set(PowerProperty::DisplayBrightness, GLOBAL_AREA, Value::Int32(level))
    }

    pub fn display_brightness(&self) -> Result<i32, VhalError> {
        let value = self.link.get(PowerProperty::DisplayBrightness, GLOBAL_AREA)?;
        value
            .value
            .as_i32()
            .ok_or_else(|| VhalError::InvalidArgument(format!("unexpected brightness {}", value.value)))
    }
}

pub fn create() -> Box<dyn PropertyHandler> {
    Box::new(PowerHandler::new())
}
