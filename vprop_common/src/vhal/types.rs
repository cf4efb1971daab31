//! Vehicle property data model.
//!
//! This module defines the records exchanged between the transport, the
//! hub and the domain handlers:
//! - `PropertyDescriptor` / `AreaConfig` - Static property configuration
//! - `PropertyValue` / `Value` - A typed value for one property and area
//! - `SubscribeFlags` - Event source selection for subscriptions
//! - `PropId` - Hex display wrapper used in log fields

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Instant;

/// Packed 32-bit vehicle property identifier.
pub type PropertyId = i32;

/// Area (zone) identifier within a property. `0` addresses a global property.
pub type AreaId = i32;

/// Area id used by properties that are not zoned.
pub const GLOBAL_AREA: AreaId = 0;

static PROCESS_START: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Monotonic nanoseconds since the first call in this process.
///
/// Used as the `timestamp` of values created on this side of the transport.
pub fn elapsed_realtime_nanos() -> i64 {
    i64::try_from(PROCESS_START.elapsed().as_nanos()).unwrap_or(i64::MAX)
}

/// Display wrapper rendering a property id as `0x11600207`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropId(pub PropertyId);

impl fmt::Display for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Access mode of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyAccess {
    /// Value can only be read.
    Read,
    /// Value can only be written.
    Write,
    /// Value can be read and written.
    ReadWrite,
}

impl PropertyAccess {
    /// True for `Read` and `ReadWrite`.
    pub fn is_readable(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// True for `Write` and `ReadWrite`.
    pub fn is_writable(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// How a property's value changes over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeMode {
    /// Never changes after boot.
    Static,
    /// Reported when the value changes.
    OnChange,
    /// Reported when the value is set.
    OnSet,
    /// Sampled continuously at a subscription rate.
    Continuous,
}

/// Payload type carried by a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    /// Single boolean.
    Bool,
    /// Single 32-bit integer.
    Int32,
    /// Vector of 32-bit integers.
    Int32Vec,
    /// Single float.
    Float,
    /// Vector of floats.
    FloatVec,
    /// UTF-8 string.
    String,
    /// Opaque bytes.
    Bytes,
    /// Mixed payload combining several typed vectors.
    Complex,
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int32Vec => "int32_vec",
            Self::Float => "float",
            Self::FloatVec => "float_vec",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Complex => "complex",
        };
        f.write_str(s)
    }
}

/// Per-area configuration with the value bounds for that area.
///
/// Bounds of `0` on both sides mean "unbounded" for that type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaConfig {
    /// Area this configuration applies to.
    pub area_id: AreaId,
    #[serde(default)]
    pub min_int32: i32,
    #[serde(default)]
    pub max_int32: i32,
    #[serde(default)]
    pub min_int64: i64,
    #[serde(default)]
    pub max_int64: i64,
    #[serde(default)]
    pub min_float: f32,
    #[serde(default)]
    pub max_float: f32,
}

/// Immutable description of one vehicle property.
///
/// Discovered once from the transport and shared by `Arc` afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Packed property id.
    pub id: PropertyId,
    /// Access mode.
    pub access: PropertyAccess,
    /// Change mode.
    pub change_mode: ChangeMode,
    /// Payload type.
    pub shape: ValueShape,
    /// Minimum sample rate in Hz (continuous properties only).
    #[serde(default)]
    pub min_sample_rate: f32,
    /// Maximum sample rate in Hz (continuous properties only).
    #[serde(default)]
    pub max_sample_rate: f32,
    /// Ordered per-area configuration. Empty for global properties.
    #[serde(default)]
    pub area_configs: Vec<AreaConfig>,
}

impl PropertyDescriptor {
    /// Create a global descriptor with no area configs and no sample rate bounds.
    pub fn new(
        id: PropertyId,
        access: PropertyAccess,
        change_mode: ChangeMode,
        shape: ValueShape,
    ) -> Self {
        Self {
            id,
            access,
            change_mode,
            shape,
            min_sample_rate: 0.0,
            max_sample_rate: 0.0,
            area_configs: Vec::new(),
        }
    }

    /// Builder-style setter for the sample rate range.
    pub fn with_sample_rates(mut self, min: f32, max: f32) -> Self {
        self.min_sample_rate = min;
        self.max_sample_rate = max;
        self
    }

    /// Builder-style setter adding one area config.
    pub fn with_area(mut self, area: AreaConfig) -> Self {
        self.area_configs.push(area);
        self
    }

    /// True when the property has no per-area configuration.
    pub fn is_global(&self) -> bool {
        self.area_configs.is_empty()
    }

    /// Look up the configuration of one area.
    pub fn area_config(&self, area_id: AreaId) -> Option<&AreaConfig> {
        self.area_configs.iter().find(|a| a.area_id == area_id)
    }

    /// True when `area_id` addresses this property.
    pub fn has_area(&self, area_id: AreaId) -> bool {
        if self.is_global() {
            area_id == GLOBAL_AREA
        } else {
            self.area_config(area_id).is_some()
        }
    }

    /// Effective subscription rate for a requested rate.
    ///
    /// Continuous properties are clamped to `[min_sample_rate, max_sample_rate]`;
    /// every other change mode is subscribed at 0 Hz.
    pub fn clamp_sample_rate(&self, requested_hz: f32) -> f32 {
        if self.change_mode != ChangeMode::Continuous {
            return 0.0;
        }
        // never panics, even on unchecked bounds
        requested_hz
            .max(self.min_sample_rate)
            .min(self.max_sample_rate.max(self.min_sample_rate))
    }

    /// Check that the sample rate bounds are finite, non-negative and ordered.
    pub fn check_sample_rates(&self) -> Result<(), String> {
        let (min, max) = (self.min_sample_rate, self.max_sample_rate);
        if !min.is_finite() || !max.is_finite() {
            return Err(format!("sample rate bounds [{min}, {max}] are not finite"));
        }
        if min < 0.0 || min > max {
            return Err(format!("invalid sample rate range [{min}, {max}]"));
        }
        Ok(())
    }
}

/// Payload of the `Complex` shape: several typed vectors at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawValue {
    #[serde(default)]
    pub int32_values: Vec<i32>,
    #[serde(default)]
    pub int64_values: Vec<i64>,
    #[serde(default)]
    pub float_values: Vec<f32>,
    #[serde(default)]
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub string_value: String,
}

/// Typed payload of a property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int32Vec(Vec<i32>),
    Float(f32),
    FloatVec(Vec<f32>),
    String(String),
    Bytes(Vec<u8>),
    Complex(RawValue),
}

impl Value {
    /// Shape of this payload.
    pub fn shape(&self) -> ValueShape {
        match self {
            Self::Bool(_) => ValueShape::Bool,
            Self::Int32(_) => ValueShape::Int32,
            Self::Int32Vec(_) => ValueShape::Int32Vec,
            Self::Float(_) => ValueShape::Float,
            Self::FloatVec(_) => ValueShape::FloatVec,
            Self::String(_) => ValueShape::String,
            Self::Bytes(_) => ValueShape::Bytes,
            Self::Complex(_) => ValueShape::Complex,
        }
    }

    /// Zero value of a shape.
    pub fn default_for(shape: ValueShape) -> Self {
        match shape {
            ValueShape::Bool => Self::Bool(false),
            ValueShape::Int32 => Self::Int32(0),
            ValueShape::Int32Vec => Self::Int32Vec(Vec::new()),
            ValueShape::Float => Self::Float(0.0),
            ValueShape::FloatVec => Self::FloatVec(Vec::new()),
            ValueShape::String => Self::String(String::new()),
            ValueShape::Bytes => Self::Bytes(Vec::new()),
            ValueShape::Complex => Self::Complex(RawValue::default()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32_slice(&self) -> Option<&[i32]> {
        match self {
            Self::Int32Vec(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        match self {
            Self::FloatVec(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&RawValue> {
        match self {
            Self::Complex(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int32Vec(v) => write!(f, "{v:?}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::FloatVec(v) => write!(f, "{v:?}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Complex(v) => write!(
                f,
                "{{i32={:?} i64={:?} f32={:?} bytes={} str={:?}}}",
                v.int32_values,
                v.int64_values,
                v.float_values,
                v.bytes.len(),
                v.string_value
            ),
        }
    }
}

/// A value of one property in one area at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub prop_id: PropertyId,
    pub area_id: AreaId,
    /// Elapsed-realtime timestamp in nanoseconds.
    pub timestamp: i64,
    pub value: Value,
}

impl PropertyValue {
    pub fn new(prop_id: PropertyId, area_id: AreaId, timestamp: i64, value: Value) -> Self {
        Self {
            prop_id,
            area_id,
            timestamp,
            value,
        }
    }

    /// Request record for a synchronous get. The payload is ignored by the transport.
    pub fn request(prop_id: PropertyId, area_id: AreaId) -> Self {
        Self::new(prop_id, area_id, 0, Value::Complex(RawValue::default()))
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} area={:#x} ts={} {}",
            PropId(self.prop_id),
            self.area_id,
            self.timestamp,
            self.value
        )
    }
}

bitflags! {
    /// Which event sources a subscription listens to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SubscribeFlags: u8 {
        /// Events originating from the vehicle.
        const EVENTS_FROM_CAR = 0x1;
        /// Events caused by set calls from this side of the transport.
        const EVENTS_FROM_ANDROID = 0x2;
    }
}

impl Default for SubscribeFlags {
    fn default() -> Self {
        Self::EVENTS_FROM_CAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn continuous() -> PropertyDescriptor {
        PropertyDescriptor::new(
            0x11600207,
            PropertyAccess::Read,
            ChangeMode::Continuous,
            ValueShape::Float,
        )
        .with_sample_rates(1.0, 10.0)
    }

    #[test]
    fn access_predicates() {
        assert!(PropertyAccess::Read.is_readable());
        assert!(!PropertyAccess::Read.is_writable());
        assert!(PropertyAccess::ReadWrite.is_readable());
        assert!(PropertyAccess::ReadWrite.is_writable());
        assert!(!PropertyAccess::Write.is_readable());
    }

    #[test]
    fn clamp_sample_rate_continuous() {
        let desc = continuous();
        assert_eq!(desc.clamp_sample_rate(0.0), 1.0);
        assert_eq!(desc.clamp_sample_rate(5.0), 5.0);
        assert_eq!(desc.clamp_sample_rate(100.0), 10.0);
    }

    #[test]
    fn clamp_sample_rate_tolerates_nan_bounds() {
        let desc = continuous().with_sample_rates(f32::NAN, 10.0);
        assert_eq!(desc.clamp_sample_rate(5.0), 5.0);
        assert_eq!(desc.clamp_sample_rate(50.0), 10.0);
        assert!(desc.check_sample_rates().is_err());
    }

    #[test]
    fn check_sample_rates_ranges() {
        assert!(continuous().check_sample_rates().is_ok());
        assert!(continuous().with_sample_rates(0.0, 0.0).check_sample_rates().is_ok());
        assert!(continuous().with_sample_rates(10.0, 1.0).check_sample_rates().is_err());
        assert!(continuous().with_sample_rates(-1.0, 1.0).check_sample_rates().is_err());
        assert!(
            continuous()
                .with_sample_rates(1.0, f32::INFINITY)
                .check_sample_rates()
                .is_err()
        );
    }

    #[test]
    fn clamp_sample_rate_on_change_is_zero() {
        let desc = PropertyDescriptor::new(
            0x11200402,
            PropertyAccess::Read,
            ChangeMode::OnChange,
            ValueShape::Bool,
        );
        assert_eq!(desc.clamp_sample_rate(20.0), 0.0);
    }

    #[test]
    fn has_area_global_and_zoned() {
        let global = continuous();
        assert!(global.has_area(GLOBAL_AREA));
        assert!(!global.has_area(1));

        let zoned = PropertyDescriptor::new(
            0x15400500,
            PropertyAccess::ReadWrite,
            ChangeMode::OnChange,
            ValueShape::Int32,
        )
        .with_area(AreaConfig {
            area_id: 1,
            max_int32: 7,
            ..Default::default()
        });
        assert!(zoned.has_area(1));
        assert!(!zoned.has_area(GLOBAL_AREA));
        assert_eq!(zoned.area_config(1).map(|a| a.max_int32), Some(7));
    }

    #[test]
    fn value_shape_matches_variant() {
        for shape in [
            ValueShape::Bool,
            ValueShape::Int32,
            ValueShape::Int32Vec,
            ValueShape::Float,
            ValueShape::FloatVec,
            ValueShape::String,
            ValueShape::Bytes,
            ValueShape::Complex,
        ] {
            assert_eq!(Value::default_for(shape).shape(), shape);
        }
    }

    #[test]
    fn prop_id_display_is_hex() {
        assert_eq!(PropId(0x11600207).to_string(), "0x11600207");
    }

    #[test]
    fn descriptor_from_toml() {
        let desc: PropertyDescriptor = toml::from_str(
            r#"
id = 0x15600503
access = "read_write"
change_mode = "on_change"
shape = "float"

[[area_configs]]
area_id = 1
min_float = 16.0
max_float = 32.0
"#,
        )
        .unwrap();
        assert_eq!(desc.access, PropertyAccess::ReadWrite);
        assert_eq!(desc.area_configs.len(), 1);
        assert_eq!(desc.area_configs[0].max_float, 32.0);
    }

    #[test]
    fn default_subscribe_flags() {
        assert_eq!(SubscribeFlags::default(), SubscribeFlags::EVENTS_FROM_CAR);
    }
}
