//! Sensor handler.
//!
//! Converts driving-state properties into `SensorReading`s and keeps the
//! latest reading of each sensor. Continuous sensors are resubscribed at
//! `CONTINUOUS_RATE_HZ` during init (the hub clamps to the descriptor range).

use super::{HandlerLink, Listener};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HubContext, PropertyHandler};
use vprop_common::vhal::props::{
    ENGINE_RPM, FUEL_LEVEL, GEAR_SELECTION, IGNITION_STATE, NIGHT_MODE, PARKING_BRAKE_ON,
    PERF_ODOMETER, PERF_VEHICLE_SPEED,
};
use vprop_common::vhal::types::{ChangeMode, PropertyDescriptor, PropertyId, PropertyValue};

pub const NAME: &str = "sensor";

/// Rate requested for continuous sensors.
pub const CONTINUOUS_RATE_HZ: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorType {
    Speed,
    Rpm,
    Odometer,
    FuelLevel,
    Gear,
    ParkingBrake,
    NightMode,
    Ignition,
}

const ID_TABLE: &[(SensorType, PropertyId)] = &[
    (SensorType::Speed, PERF_VEHICLE_SPEED),
    (SensorType::Rpm, ENGINE_RPM),
    (SensorType::Odometer, PERF_ODOMETER),
    (SensorType::FuelLevel, FUEL_LEVEL),
    (SensorType::Gear, GEAR_SELECTION),
    (SensorType::ParkingBrake, PARKING_BRAKE_ON),
    (SensorType::NightMode, NIGHT_MODE),
    (SensorType::Ignition, IGNITION_STATE),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorValue {
    Float(f32),
    Int(i32),
    Flag(bool),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub sensor: SensorType,
    pub timestamp: i64,
    pub value: SensorValue,
}

type ReadingCache = Arc<Mutex<BTreeMap<SensorType, SensorReading>>>;

pub struct SensorHandler {
    link: HandlerLink<SensorType>,
    claimed: Vec<SensorType>,
    latest: ReadingCache,
    listener: Option<Listener<SensorReading>>,
}

impl SensorHandler {
    pub fn new() -> Self {
        Self {
            link: HandlerLink::new(NAME, ID_TABLE),
            claimed: Vec::new(),
            latest: ReadingCache::default(),
            listener: None,
        }
    }

    pub fn with_listener(
        mut self,
        listener: impl FnMut(&SensorReading) + Send + 'static,
    ) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn control(&self) -> SensorControl {
        SensorControl {
            link: self.link.clone(),
            latest: self.latest.clone(),
        }
    }

    fn translate(&self, value: &PropertyValue) -> Option<SensorReading> {
        let sensor = self.link.manager_id(value.prop_id)?;
        let converted = match sensor {
            SensorType::Speed | SensorType::Rpm | SensorType::Odometer | SensorType::FuelLevel => {
                SensorValue::Float(value.value.as_f32()?)
            }
            SensorType::Gear | SensorType::Ignition => SensorValue::Int(value.value.as_i32()?),
            SensorType::ParkingBrake | SensorType::NightMode => {
                SensorValue::Flag(value.value.as_bool()?)
            }
        };
        Some(SensorReading {
            sensor,
            timestamp: value.timestamp,
            value: converted,
        })
    }
}

impl Default for SensorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyHandler for SensorHandler {
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
        for sensor in &self.claimed {
            let Some(prop_id) = self.link.map().hal_id(*sensor) else {
                continue;
            };
            let continuous = ctx
                .descriptor(prop_id)
                .is_some_and(|d| d.change_mode == ChangeMode::Continuous);
            if !continuous {
                continue;
            }
            if let Err(e) = ctx.subscribe(prop_id, CONTINUOUS_RATE_HZ, Default::default()) {
                warn!("Cannot raise rate of {sensor:?}: {e}");
            }
        }
        self.link.slot().attach(ctx);
    }

    fn on_release(&mut self) {
        self.link.slot().detach();
        self.listener = None;
        self.latest.lock().clear();
    }

    fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
        for value in &values {
            let Some(reading) = self.translate(value) else {
                debug!("Untranslatable sensor value {value}");
                continue;
            };
            self.latest.lock().insert(reading.sensor, reading);
            if let Some(listener) = self.listener.as_mut() {
                listener(&reading);
            }
        }
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "  claimed: {:?}", self.claimed)?;
        for reading in self.latest.lock().values() {
            writeln!(
                out,
                "  {:?} = {} @{}",
                reading.sensor, reading.value, reading.timestamp
            )?;
        }
        Ok(())
    }
}

/// Read access to the latest readings and sensor rates.
#[derive(Clone)]
pub struct SensorControl {
    link: HandlerLink<SensorType>,
    latest: ReadingCache,
}

impl SensorControl {
    pub fn latest(&self, sensor: SensorType) -> Option<SensorReading> {
        self.latest.lock().get(&sensor).copied()
    }

    pub fn set_rate(&self, sensor: SensorType, rate_hz: f32) -> Result<(), VhalError> {
        self.link.subscribe(sensor, rate_hz)
    }
}

pub fn create() -> Box<dyn PropertyHandler> {
    Box::new(SensorHandler::new())
}
