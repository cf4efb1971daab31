//! Diagnostic handler: OBD2 live and freeze frames.
//!
//! Frames use the complex payload: integer sensors in `int32_values`, float
//! sensors in `float_values`, the trouble code (freeze frames only) in
//! `string_value`. Freeze frames are addressed by their timestamp, passed in
//! `int64_values`.

use super::{HandlerLink, Listener};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HubContext, PropertyHandler};
use vprop_common::vhal::props::{OBD2_FREEZE_FRAME, OBD2_FREEZE_FRAME_CLEAR, OBD2_LIVE_FRAME};
use vprop_common::vhal::types::{
    GLOBAL_AREA, PropertyDescriptor, PropertyId, PropertyValue, RawValue, Value,
};

pub const NAME: &str = "diagnostic";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticProperty {
    LiveFrame,
    FreezeFrame,
    FreezeFrameClear,
}

const ID_TABLE: &[(DiagnosticProperty, PropertyId)] = &[
    (DiagnosticProperty::LiveFrame, OBD2_LIVE_FRAME),
    (DiagnosticProperty::FreezeFrame, OBD2_FREEZE_FRAME),
    (DiagnosticProperty::FreezeFrameClear, OBD2_FREEZE_FRAME_CLEAR),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Live,
    Freeze,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticFrame {
    pub kind: FrameKind,
    pub timestamp: i64,
    pub int_sensors: Vec<i32>,
    pub float_sensors: Vec<f32>,
    pub trouble_code: Option<String>,
}

impl DiagnosticFrame {
    fn from_raw(kind: FrameKind, timestamp: i64, raw: &RawValue) -> Self {
        let trouble_code = (kind == FrameKind::Freeze && !raw.string_value.is_empty())
            .then(|| raw.string_value.clone());
        Self {
            kind,
            timestamp,
            int_sensors: raw.int32_values.clone(),
            float_sensors: raw.float_values.clone(),
            trouble_code,
        }
    }
}

pub struct DiagnosticHandler {
    link: HandlerLink<DiagnosticProperty>,
    claimed: Vec<DiagnosticProperty>,
    last_live: Option<DiagnosticFrame>,
    freeze_events: u64,
    listener: Option<Listener<DiagnosticFrame>>,
}

impl DiagnosticHandler {
    pub fn new() -> Self {
        Self {
            link: HandlerLink::new(NAME, ID_TABLE),
            claimed: Vec::new(),
            last_live: None,
            freeze_events: 0,
            listener: None,
        }
    }

    pub fn with_listener(
        mut self,
        listener: impl FnMut(&DiagnosticFrame) + Send + 'static,
    ) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn control(&self) -> DiagnosticControl {
        DiagnosticControl {
            link: self.link.clone(),
        }
    }
}

impl Default for DiagnosticHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyHandler for DiagnosticHandler {
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
        self.last_live = None;
    }

    fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
        for value in &values {
            let kind = match self.link.manager_id(value.prop_id) {
                Some(DiagnosticProperty::LiveFrame) => FrameKind::Live,
                Some(DiagnosticProperty::FreezeFrame) => FrameKind::Freeze,
                _ => continue,
            };
            let Some(raw) = value.value.as_raw() else {
                debug!("Diagnostic frame without complex payload: {value}");
                continue;
            };
            let frame = DiagnosticFrame::from_raw(kind, value.timestamp, raw);
            match kind {
                FrameKind::Live => self.last_live = Some(frame.clone()),
                FrameKind::Freeze => {
                    info!("Freeze frame recorded, trouble code {:?}", frame.trouble_code);
                    self.freeze_events += 1;
                }
            }
            if let Some(listener) = self.listener.as_mut() {
                listener(&frame);
            }
        }
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "  claimed: {:?}", self.claimed)?;
        writeln!(out, "  freeze events: {}", self.freeze_events)?;
        match &self.last_live {
            Some(frame) => writeln!(
                out,
                "  live @{}: {} int, {} float sensors",
                frame.timestamp,
                frame.int_sensors.len(),
                frame.float_sensors.len()
            ),
            None => writeln!(out, "  live: none"),
        }
    }
}

/// Freeze frame retrieval and clearing.
#[derive(Clone)]
pub struct DiagnosticControl {
    link: HandlerLink<DiagnosticProperty>,
}

impl DiagnosticControl {
    pub fn live_frame(&self) -> Result<DiagnosticFrame, VhalError> {
        let value = self.link.get(DiagnosticProperty::LiveFrame, GLOBAL_AREA)?;
        frame_of(FrameKind::Live, &value)
    }

    /// Freeze frame recorded at `timestamp`.
    pub fn freeze_frame(&self, timestamp: i64) -> Result<DiagnosticFrame, VhalError> {
        let params = Value::Complex(RawValue {
            int64_values: vec![timestamp],
            ..Default::default()
        });
        let value = self
            .link
            .query(DiagnosticProperty::FreezeFrame, GLOBAL_AREA, params)?;
        frame_of(FrameKind::Freeze, &value)
    }

    /// Clear the given freeze frames, or all of them when `timestamps` is empty.
    pub fn clear_freeze_frames(&self, timestamps: &[i64]) -> Result<(), VhalError> {
        let payload = Value::Complex(RawValue {
            int64_values: timestamps.to_vec(),
            ..Default::default()
        });
        self.link
            .set(DiagnosticProperty::FreezeFrameClear, GLOBAL_AREA, payload)
    }
}

fn frame_of(kind: FrameKind, value: &PropertyValue) -> Result<DiagnosticFrame, VhalError> {
    let raw = value
        .value
        .as_raw()
        .ok_or_else(|| VhalError::InvalidArgument(format!("not a diagnostic frame: {}", value.value)))?;
    Ok(DiagnosticFrame::from_raw(kind, value.timestamp, raw))
}

pub fn create() -> Box<dyn PropertyHandler> {
    Box::new(DiagnosticHandler::new())
}
