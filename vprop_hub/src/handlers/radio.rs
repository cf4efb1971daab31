//! Radio handler: station presets.

use super::{HandlerLink, Listener};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HubContext, PropertyHandler};
use vprop_common::vhal::props::RADIO_PRESET;
use vprop_common::vhal::types::{GLOBAL_AREA, PropertyDescriptor, PropertyId, PropertyValue, Value};

pub const NAME: &str = "radio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioProperty {
    Preset,
}

const ID_TABLE: &[(RadioProperty, PropertyId)] = &[(RadioProperty::Preset, RADIO_PRESET)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Am,
    Fm,
    FmHd,
    AmHd,
}

impl Band {
    fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Am),
            1 => Some(Self::Fm),
            2 => Some(Self::FmHd),
            3 => Some(Self::AmHd),
            _ => None,
        }
    }

    fn code(self) -> i32 {
        match self {
            Self::Am => 0,
            Self::Fm => 1,
            Self::FmHd => 2,
            Self::AmHd => 3,
        }
    }
}

/// One stored station. Presets are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioPreset {
    pub number: i32,
    pub band: Band,
    pub channel: i32,
    pub sub_channel: i32,
}

impl RadioPreset {
    fn from_raw(raw: &[i32]) -> Option<Self> {
        match raw {
            [number, band, channel, sub_channel, ..] if *number >= 1 => Some(Self {
                number: *number,
                band: Band::from_code(*band)?,
                channel: *channel,
                sub_channel: *sub_channel,
            }),
            _ => None,
        }
    }

    fn to_raw(self) -> Vec<i32> {
        vec![self.number, self.band.code(), self.channel, self.sub_channel]
    }
}

type PresetTable = Arc<Mutex<BTreeMap<i32, RadioPreset>>>;

pub struct RadioHandler {
    link: HandlerLink<RadioProperty>,
    claimed: bool,
    presets: PresetTable,
    listener: Option<Listener<RadioPreset>>,
}

impl RadioHandler {
    pub fn new() -> Self {
        Self {
            link: HandlerLink::new(NAME, ID_TABLE),
            claimed: false,
            presets: PresetTable::default(),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl FnMut(&RadioPreset) + Send + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn control(&self) -> RadioControl {
        RadioControl {
            link: self.link.clone(),
            presets: self.presets.clone(),
        }
    }
}

impl Default for RadioHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyHandler for RadioHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn claim_properties(
        &mut self,
        offered: &[Arc<PropertyDescriptor>],
    ) -> Vec<Arc<PropertyDescriptor>> {
        let claimed = self.link.claim(offered);
        self.claimed = !claimed.is_empty();
        claimed
    }

    fn on_init(&mut self, ctx: Arc<dyn HubContext>) {
        self.link.slot().attach(ctx);
    }

    fn on_release(&mut self) {
        self.link.slot().detach();
        self.listener = None;
        self.presets.lock().clear();
    }

    fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
        for value in &values {
            let Some(preset) = value.value.as_i32_slice().and_then(RadioPreset::from_raw) else {
                debug!("Malformed radio preset {value}");
                continue;
            };
            self.presets.lock().insert(preset.number, preset);
            if let Some(listener) = self.listener.as_mut() {
                listener(&preset);
            }
        }
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "  claimed={}", self.claimed)?;
        for preset in self.presets.lock().values() {
            writeln!(
                out,
                "  #{} {:?} {}.{}",
                preset.number, preset.band, preset.channel, preset.sub_channel
            )?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct RadioControl {
    link: HandlerLink<RadioProperty>,
    presets: PresetTable,
}

impl RadioControl {
    pub fn store_preset(&self, preset: RadioPreset) -> Result<(), VhalError> {
        if preset.number < 1 {
            return Err(VhalError::InvalidArgument(format!(
                "preset number {} must be at least 1",
                preset.number
            )));
        }
        self.link
            .set(RadioProperty::Preset, GLOBAL_AREA, Value::Int32Vec(preset.to_raw()))
    }

    pub fn preset(&self, number: i32) -> Option<RadioPreset> {
        self.presets.lock().get(&number).copied()
    }
}

pub fn create() -> Box<dyn PropertyHandler> {
    Box::new(RadioHandler::new())
}
