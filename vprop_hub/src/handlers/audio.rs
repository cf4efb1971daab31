//! Audio handler: focus, per-stream volume and volume limits.

use super::{HandlerLink, Listener};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HubContext, PropertyHandler};
use vprop_common::vhal::props::{AUDIO_FOCUS, AUDIO_VOLUME, AUDIO_VOLUME_LIMIT};
use vprop_common::vhal::types::{
    AreaId, GLOBAL_AREA, PropId, PropertyDescriptor, PropertyId, PropertyValue, Value,
};

pub const NAME: &str = "audio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioProperty {
    Focus,
    Volume,
    VolumeLimit,
}

const ID_TABLE: &[(AudioProperty, PropertyId)] = &[
    (AudioProperty::Focus, AUDIO_FOCUS),
    (AudioProperty::Volume, AUDIO_VOLUME),
    (AudioProperty::VolumeLimit, AUDIO_VOLUME_LIMIT),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    Gain,
    GainTransient,
    LossTransient,
    Loss,
}

impl FocusState {
    fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Gain),
            2 => Some(Self::GainTransient),
            4 => Some(Self::LossTransient),
            8 => Some(Self::Loss),
            _ => None,
        }
    }

    fn code(self) -> i32 {
        match self {
            Self::Gain => 1,
            Self::GainTransient => 2,
            Self::LossTransient => 4,
            Self::Loss => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEvent {
    Focus { state: FocusState, streams: i32 },
    Volume { stream: i32, volume: i32 },
    VolumeLimit { stream: i32, max: i32 },
}

#[derive(Debug, Default)]
struct AudioState {
    focus: Option<(FocusState, i32)>,
    volumes: BTreeMap<i32, i32>,
    limits: BTreeMap<i32, i32>,
    set_errors: u32,
}

pub struct AudioHandler {
    link: HandlerLink<AudioProperty>,
    claimed: Vec<AudioProperty>,
    state: Arc<Mutex<AudioState>>,
    listener: Option<Listener<AudioEvent>>,
}

impl AudioHandler {
    pub fn new() -> Self {
        Self {
            link: HandlerLink::new(NAME, ID_TABLE),
            claimed: Vec::new(),
            state: Arc::default(),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl FnMut(&AudioEvent) + Send + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn control(&self) -> AudioControl {
        AudioControl {
            link: self.link.clone(),
            state: self.state.clone(),
        }
    }

    fn translate(&self, value: &PropertyValue) -> Option<AudioEvent> {
        let raw = value.value.as_i32_slice()?;
        let first = *raw.first()?;
        let second = *raw.get(1)?;
        match self.link.manager_id(value.prop_id)? {
            AudioProperty::Focus => Some(AudioEvent::Focus {
                state: FocusState::from_code(first)?,
                streams: second,
            }),
            AudioProperty::Volume => Some(AudioEvent::Volume {
                stream: first,
                volume: second,
            }),
            AudioProperty::VolumeLimit => Some(AudioEvent::VolumeLimit {
                stream: first,
                max: second,
            }),
        }
    }
}

impl Default for AudioHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyHandler for AudioHandler {
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
    }

    fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
        for value in &values {
            let Some(event) = self.translate(value) else {
                debug!("Untranslatable audio value {value}");
                continue;
            };
            {
                let mut state = self.state.lock();
                match event {
                    AudioEvent::Focus { state: focus, streams } => {
                        state.focus = Some((focus, streams));
                    }
                    AudioEvent::Volume { stream, volume } => {
                        state.volumes.insert(stream, volume);
                    }
                    AudioEvent::VolumeLimit { stream, max } => {
                        state.limits.insert(stream, max);
                    }
                }
            }
            if let Some(listener) = self.listener.as_mut() {
                listener(&event);
            }
        }
    }

    fn on_set_error(&mut self, prop_id: PropertyId, area_id: AreaId) {
        warn!(prop = %PropId(prop_id), "Audio set rejected for area {area_id:#x}");
        self.state.lock().set_errors += 1;
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let state = self.state.lock();
        writeln!(out, "  claimed: {:?}", self.claimed)?;
        writeln!(out, "  focus: {:?}", state.focus)?;
        writeln!(out, "  volumes: {:?}", state.volumes)?;
        writeln!(out, "  limits: {:?}", state.limits)?;
        writeln!(out, "  set errors: {}", state.set_errors)
    }
}

/// Focus requests and volume changes.
#[derive(Clone)]
pub struct AudioControl {
    link: HandlerLink<AudioProperty>,
    state: Arc<Mutex<AudioState>>,
}

impl AudioControl {
    pub fn request_focus(&self, focus: FocusState, streams: i32) -> Result<(), VhalError> {
        self.link.set(
            AudioProperty::Focus,
            GLOBAL_AREA,
            Value::Int32Vec(vec![focus.code(), streams, 0]),
        )
    }

    /// Set the volume of one stream. Rejected above the last reported limit.
    pub fn set_volume(&self, stream: i32, volume: i32) -> Result<(), VhalError> {
        let limit = self.state.lock().limits.get(&stream).copied();
        if let Some(max) = limit.filter(|max| volume > *max) {
            return Err(VhalError::InvalidArgument(format!(
                "volume {volume} above limit {max} of stream {stream}"
            )));
        }
        self.link.set(
            AudioProperty::Volume,
            GLOBAL_AREA,
            Value::Int32Vec(vec![stream, volume, 0]),
        )
    }

    pub fn volume(&self, stream: i32) -> Option<i32> {
        self.state.lock().volumes.get(&stream).copied()
    }

    pub fn focus(&self) -> Option<(FocusState, i32)> {
        self.state.lock().focus
    }
}

pub fn create() -> Box<dyn PropertyHandler> {
    Box::new(AudioHandler::new())
}
