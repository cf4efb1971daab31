//! Vehicle property id encoding and well-known property ids.
//!
//! A property id packs three fields next to a 16-bit index:
//!
//! ```text
//!  31    28 27    24 23           16 15                 0
//! ┌────────┬────────┬───────────────┬────────────────────┐
//! │ group  │  area  │  value type   │       index        │
//! └────────┴────────┴───────────────┴────────────────────┘
//! ```

use crate::vhal::types::{PropertyId, ValueShape};

// ─── Masks ──────────────────────────────────────────────────────────

pub const GROUP_MASK: i32 = 0xf000_0000_u32 as i32;
pub const AREA_TYPE_MASK: i32 = 0x0f00_0000;
pub const VALUE_TYPE_MASK: i32 = 0x00ff_0000;

// ─── Groups ─────────────────────────────────────────────────────────

pub const GROUP_SYSTEM: i32 = 0x1000_0000;
pub const GROUP_VENDOR: i32 = 0x2000_0000;

// ─── Value types ────────────────────────────────────────────────────

pub const TYPE_STRING: i32 = 0x0010_0000;
pub const TYPE_BOOLEAN: i32 = 0x0020_0000;
pub const TYPE_INT32: i32 = 0x0040_0000;
pub const TYPE_INT32_VEC: i32 = 0x0041_0000;
pub const TYPE_FLOAT: i32 = 0x0060_0000;
pub const TYPE_FLOAT_VEC: i32 = 0x0061_0000;
pub const TYPE_BYTES: i32 = 0x0070_0000;
pub const TYPE_MIXED: i32 = 0x00e0_0000;

/// Zone dimension of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaType {
    Global,
    Window,
    Mirror,
    Seat,
    Door,
    Wheel,
}

impl AreaType {
    fn from_bits(bits: i32) -> Option<Self> {
        match bits {
            0x0100_0000 => Some(Self::Global),
            0x0300_0000 => Some(Self::Window),
            0x0400_0000 => Some(Self::Mirror),
            0x0500_0000 => Some(Self::Seat),
            0x0600_0000 => Some(Self::Door),
            0x0700_0000 => Some(Self::Wheel),
            _ => None,
        }
    }
}

/// Decode the payload shape encoded in a property id.
pub fn value_shape_of(prop_id: PropertyId) -> Option<ValueShape> {
    match prop_id & VALUE_TYPE_MASK {
        TYPE_STRING => Some(ValueShape::String),
        TYPE_BOOLEAN => Some(ValueShape::Bool),
        TYPE_INT32 => Some(ValueShape::Int32),
        TYPE_INT32_VEC => Some(ValueShape::Int32Vec),
        TYPE_FLOAT => Some(ValueShape::Float),
        TYPE_FLOAT_VEC => Some(ValueShape::FloatVec),
        TYPE_BYTES => Some(ValueShape::Bytes),
        TYPE_MIXED => Some(ValueShape::Complex),
        _ => None,
    }
}

/// Decode the area type encoded in a property id.
pub fn area_type_of(prop_id: PropertyId) -> Option<AreaType> {
    AreaType::from_bits(prop_id & AREA_TYPE_MASK)
}

/// True when the id belongs to the vendor-defined group.
pub fn is_vendor_property(prop_id: PropertyId) -> bool {
    prop_id & GROUP_MASK == GROUP_VENDOR
}

// ─── Well-known properties ──────────────────────────────────────────

pub const INFO_VIN: PropertyId = 0x1110_0100;
pub const INFO_MAKE: PropertyId = 0x1110_0101;

pub const PERF_ODOMETER: PropertyId = 0x1160_0204;
pub const PERF_VEHICLE_SPEED: PropertyId = 0x1160_0207;
pub const ENGINE_RPM: PropertyId = 0x1160_0305;
pub const FUEL_LEVEL: PropertyId = 0x1160_0307;
pub const GEAR_SELECTION: PropertyId = 0x1140_0400;
pub const PARKING_BRAKE_ON: PropertyId = 0x1120_0402;
pub const NIGHT_MODE: PropertyId = 0x1120_0407;
pub const IGNITION_STATE: PropertyId = 0x1140_0409;

pub const AP_POWER_STATE_REQ: PropertyId = 0x1141_0a00;
pub const AP_POWER_STATE_REPORT: PropertyId = 0x1141_0a01;
pub const DISPLAY_BRIGHTNESS: PropertyId = 0x1140_0a03;
pub const HW_KEY_INPUT: PropertyId = 0x1141_0a10;

pub const HVAC_FAN_SPEED: PropertyId = 0x1540_0500;
pub const HVAC_TEMPERATURE_SET: PropertyId = 0x1560_0503;
pub const HVAC_AC_ON: PropertyId = 0x1520_0505;
pub const HVAC_POWER_ON: PropertyId = 0x1520_0510;

pub const DOOR_POS: PropertyId = 0x1640_0b00;
pub const DOOR_LOCK: PropertyId = 0x1620_0b02;
pub const MIRROR_FOLD: PropertyId = 0x1120_0b46;
pub const WINDOW_POS: PropertyId = 0x1340_0bc0;
pub const WINDOW_LOCK: PropertyId = 0x1320_0bc4;

pub const AUDIO_FOCUS: PropertyId = 0x1141_0900;
pub const AUDIO_VOLUME: PropertyId = 0x1141_0901;
pub const AUDIO_VOLUME_LIMIT: PropertyId = 0x1141_0902;

pub const RADIO_PRESET: PropertyId = 0x1141_0801;

pub const OBD2_LIVE_FRAME: PropertyId = 0x11e0_0d00;
pub const OBD2_FREEZE_FRAME: PropertyId = 0x11e0_0d01;
pub const OBD2_FREEZE_FRAME_CLEAR: PropertyId = 0x11e0_0d03;
