//! Input handler: hardware key events.

use super::{HandlerLink, Listener};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use vprop_common::vhal::handler::{HubContext, PropertyHandler};
use vprop_common::vhal::props::HW_KEY_INPUT;
use vprop_common::vhal::types::{PropertyDescriptor, PropertyId, PropertyValue};

pub const NAME: &str = "input";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputProperty {
    KeyInput,
}

const ID_TABLE: &[(InputProperty, PropertyId)] = &[(InputProperty::KeyInput, HW_KEY_INPUT)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDisplay {
    Main,
    Instrument,
}

/// One hardware key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub key_code: i32,
    pub display: TargetDisplay,
    pub timestamp: i64,
}

impl KeyEvent {
    /// Decode `[action, key_code, display]`.
    fn from_value(value: &PropertyValue) -> Option<Self> {
        let raw = value.value.as_i32_slice()?;
        let action = match *raw.first()? {
            0 => KeyAction::Down,
            1 => KeyAction::Up,
            _ => return None,
        };
        let key_code = *raw.get(1)?;
        let display = match raw.get(2).copied().unwrap_or(0) {
            1 => TargetDisplay::Instrument,
            _ => TargetDisplay::Main,
        };
        Some(Self {
            action,
            key_code,
            display,
            timestamp: value.timestamp,
        })
    }
}

pub struct InputHandler {
    link: HandlerLink<InputProperty>,
    claimed: bool,
    key_downs: u64,
    key_ups: u64,
    last_key: Option<KeyEvent>,
    listener: Option<Listener<KeyEvent>>,
}

impl InputHandler {
    pub fn new() -> Self {
        Self {
            link: HandlerLink::new(NAME, ID_TABLE),
            claimed: false,
            key_downs: 0,
            key_ups: 0,
            last_key: None,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl FnMut(&KeyEvent) + Send + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyHandler for InputHandler {
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
        if !self.claimed {
            debug!("No key input property available");
        }
        self.link.slot().attach(ctx);
    }

    fn on_release(&mut self) {
        self.link.slot().detach();
        self.listener = None;
    }

    fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
        for event in values.iter().filter_map(KeyEvent::from_value) {
            trace!("Key {:?} code={}", event.action, event.key_code);
            match event.action {
                KeyAction::Down => self.key_downs += 1,
                KeyAction::Up => self.key_ups += 1,
            }
            self.last_key = Some(event);
            if let Some(listener) = self.listener.as_mut() {
                listener(&event);
            }
        }
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            "  claimed={} downs={} ups={} last={:?}",
            self.claimed, self.key_downs, self.key_ups, self.last_key
        )
    }
}

pub fn create() -> Box<dyn PropertyHandler> {
    Box::new(InputHandler::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use vprop_common::vhal::types::Value;

    fn key(action: i32, code: i32, display: i32) -> PropertyValue {
        PropertyValue::new(HW_KEY_INPUT, 0, 5, Value::Int32Vec(vec![action, code, display]))
    }

    #[test]
    fn decodes_key_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut handler = InputHandler::new().with_listener(move |e| sink.lock().push(*e));
        handler.on_event_batch(vec![key(0, 24, 0), key(7, 24, 0), key(1, 24, 1)]);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].action, KeyAction::Down);
        assert_eq!(seen[1].action, KeyAction::Up);
        assert_eq!(seen[1].display, TargetDisplay::Instrument);
        assert_eq!(handler.key_downs, 1);
        assert_eq!(handler.key_ups, 1);
    }

    #[test]
    fn release_is_idempotent() {
        let mut handler = InputHandler::new().with_listener(|_| {});
        handler.on_release();
        handler.on_release();
        assert!(handler.listener.is_none());
    }
}
