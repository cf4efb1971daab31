//! HVAC handler.
//!
//! Climate settings are zoned by seat area. Set errors reported by the
//! vehicle are forwarded to the listener so a UI can roll back its state.

use super::{HandlerLink, Listener};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HubContext, PropertyHandler};
use vprop_common::vhal::props::{HVAC_AC_ON, HVAC_FAN_SPEED, HVAC_POWER_ON, HVAC_TEMPERATURE_SET};
use vprop_common::vhal::types::{
    AreaId, PropId, PropertyDescriptor, PropertyId, PropertyValue, Value,
};

pub const NAME: &str = "hvac";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HvacProperty {
    FanSpeed,
    Temperature,
    AcOn,
    PowerOn,
}

const ID_TABLE: &[(HvacProperty, PropertyId)] = &[
    (HvacProperty::FanSpeed, HVAC_FAN_SPEED),
    (HvacProperty::Temperature, HVAC_TEMPERATURE_SET),
    (HvacProperty::AcOn, HVAC_AC_ON),
    (HvacProperty::PowerOn, HVAC_POWER_ON),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClimateSetting {
    FanSpeed(i32),
    Temperature(f32),
    AcOn(bool),
    PowerOn(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HvacEvent {
    Changed { zone: AreaId, setting: ClimateSetting },
    SetFailed { property: HvacProperty, zone: AreaId },
}

pub struct HvacHandler {
    link: HandlerLink<HvacProperty>,
    claimed: Vec<HvacProperty>,
    settings: Arc<Mutex<BTreeMap<(HvacProperty, AreaId), ClimateSetting>>>,
    failed_sets: u32,
    listener: Option<Listener<HvacEvent>>,
}

impl HvacHandler {
    pub fn new() -> Self {
        Self {
            link: HandlerLink::new(NAME, ID_TABLE),
            claimed: Vec::new(),
            settings: Arc::default(),
            failed_sets: 0,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl FnMut(&HvacEvent) + Send + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn control(&self) -> HvacControl {
        HvacControl {
            link: self.link.clone(),
            settings: self.settings.clone(),
        }
    }

    fn translate(&self, value: &PropertyValue) -> Option<(HvacProperty, ClimateSetting)> {
        let property = self.link.manager_id(value.prop_id)?;
        let setting = match property {
            HvacProperty::FanSpeed => ClimateSetting::FanSpeed(value.value.as_i32()?),
            HvacProperty::Temperature => ClimateSetting::Temperature(value.value.as_f32()?),
            HvacProperty::AcOn => ClimateSetting::AcOn(value.value.as_bool()?),
            HvacProperty::PowerOn => ClimateSetting::PowerOn(value.value.as_bool()?),
        };
        Some((property, setting))
    }

    fn notify(&mut self, event: HvacEvent) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&event);
        }
    }
}

impl Default for HvacHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyHandler for HvacHandler {
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
        self.settings.lock().clear();
    }

    fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
        for value in &values {
            let Some((property, setting)) = self.translate(value) else {
                debug!("Untranslatable hvac value {value}");
                continue;
            };
            self.settings
                .lock()
                .insert((property, value.area_id), setting);
            self.notify(HvacEvent::Changed {
                zone: value.area_id,
                setting,
            });
        }
    }

    fn on_set_error(&mut self, prop_id: PropertyId, area_id: AreaId) {
        let Some(property) = self.link.manager_id(prop_id) else {
            return;
        };
        warn!(prop = %PropId(prop_id), "HVAC {property:?} set failed in zone {area_id:#x}");
        self.failed_sets += 1;
        self.notify(HvacEvent::SetFailed {
            property,
            zone: area_id,
        });
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "  claimed: {:?}", self.claimed)?;
        for ((property, zone), setting) in self.settings.lock().iter() {
            writeln!(out, "  {property:?} zone={zone:#x} {setting:?}")?;
        }
        writeln!(out, "  failed sets: {}", self.failed_sets)
    }
}

/// Climate commands, checked against the zone bounds of the descriptor.
#[derive(Clone)]
pub struct HvacControl {
    link: HandlerLink<HvacProperty>,
    settings: Arc<Mutex<BTreeMap<(HvacProperty, AreaId), ClimateSetting>>>,
}

impl HvacControl {
    pub fn set_temperature(&self, zone: AreaId, celsius: f32) -> Result<(), VhalError> {
        if let Some(area) = self
            .link
            .descriptor(HvacProperty::Temperature)
            .and_then(|d| d.area_config(zone).cloned())
        {
            let bounded = area.min_float != 0.0 || area.max_float != 0.0;
            if bounded && !(area.min_float..=area.max_float).contains(&celsius) {
                return Err(VhalError::InvalidArgument(format!(
                    "temperature {celsius} outside [{}, {}] in zone {zone:#x}",
                    area.min_float, area.max_float
                )));
            }
        }
        self.link
            .set(HvacProperty::Temperature, zone, Value::Float(celsius))
    }

    pub fn set_fan_speed(&self, zone: AreaId, speed: i32) -> Result<(), VhalError> {
        if let Some(area) = self
            .link
            .descriptor(HvacProperty::FanSpeed)
            .and_then(|d| d.area_config(zone).cloned())
        {
            let bounded = area.min_int32 != 0 || area.max_int32 != 0;
            if bounded && !(area.min_int32..=area.max_int32).contains(&speed) {
                return Err(VhalError::InvalidArgument(format!(
                    "fan speed {speed} outside [{}, {}] in zone {zone:#x}",
                    area.min_int32, area.max_int32
                )));
            }
        }
        self.link.set(HvacProperty::FanSpeed, zone, Value::Int32(speed))
    }

    pub fn set_ac(&self, zone: AreaId, on: bool) -> Result<(), VhalError> {
        self.link.set(HvacProperty::AcOn, zone, Value::Bool(on))
    }

    pub fn set_power(&self, zone: AreaId, on: bool) -> Result<(), VhalError> {
        self.link.set(HvacProperty::PowerOn, zone, Value::Bool(on))
    }

    /// Last reported setting in one zone.
    pub fn setting(&self, property: HvacProperty, zone: AreaId) -> Option<ClimateSetting> {
        self.settings.lock().get(&(property, zone)).copied()
    }
}

pub fn create() -> Box<dyn PropertyHandler> {
    Box::new(HvacHandler::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::FakeContext;
    use vprop_common::vhal::types::{AreaConfig, ChangeMode, PropertyAccess, ValueShape};

    const DRIVER: AreaId = 0x1;
    const PASSENGER: AreaId = 0x4;

    fn temperature_desc() -> Arc<PropertyDescriptor> {
        Arc::new(
            PropertyDescriptor::new(
                HVAC_TEMPERATURE_SET,
                PropertyAccess::ReadWrite,
                ChangeMode::OnChange,
                ValueShape::Float,
            )
            .with_area(AreaConfig {
                area_id: DRIVER,
                min_float: 16.0,
                max_float: 28.0,
                ..Default::default()
            })
            .with_area(AreaConfig {
                area_id: PASSENGER,
                min_float: 16.0,
                max_float: 28.0,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn zone_settings_are_tracked() {
        let mut handler = HvacHandler::new();
        let control = handler.control();
        handler.on_event_batch(vec![
            PropertyValue::new(HVAC_TEMPERATURE_SET, DRIVER, 1, Value::Float(21.5)),
            PropertyValue::new(HVAC_TEMPERATURE_SET, PASSENGER, 1, Value::Float(19.0)),
            PropertyValue::new(HVAC_AC_ON, DRIVER, 2, Value::Bool(true)),
        ]);
        assert_eq!(
            control.setting(HvacProperty::Temperature, PASSENGER),
            Some(ClimateSetting::Temperature(19.0))
        );
        assert_eq!(
            control.setting(HvacProperty::AcOn, DRIVER),
            Some(ClimateSetting::AcOn(true))
        );
    }

    #[test]
    fn temperature_outside_zone_bounds_rejected() {
        let ctx = FakeContext::with_descriptors(&[temperature_desc()]);
        let mut handler = HvacHandler::new();
        handler.on_init(ctx.clone());
        let control = handler.control();

        assert!(matches!(
            control.set_temperature(DRIVER, 35.0),
            Err(VhalError::InvalidArgument(_))
        ));
        control.set_temperature(DRIVER, 22.0).unwrap();
        assert_eq!(ctx.sets.lock().len(), 1);
        assert_eq!(ctx.sets.lock()[0].area_id, DRIVER);
    }

    #[test]
    fn set_errors_reach_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut handler = HvacHandler::new().with_listener(move |e| sink.lock().push(*e));
        handler.on_set_error(HVAC_FAN_SPEED, PASSENGER);
        handler.on_set_error(0x1140_0001, PASSENGER);
        assert_eq!(
            *seen.lock(),
            vec![HvacEvent::SetFailed {
                property: HvacProperty::FanSpeed,
                zone: PASSENGER
            }]
        );
        assert_eq!(handler.failed_sets, 1);
    }
}
