//! Per-property event counters for dumps. Never read by dispatch.

use std::collections::BTreeMap;
use std::fmt;
use vprop_common::vhal::types::{PropId, PropertyId, PropertyValue};

/// Counter and last value of one property.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    pub prop_id: PropertyId,
    pub event_count: u64,
    pub last_event: PropertyValue,
}

#[derive(Debug, Default)]
pub struct EventLog {
    entries: BTreeMap<PropertyId, EventLogEntry>,
    set_ack_count: u64,
    last_set_ack: Option<PropertyValue>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a delivered event.
    pub fn record(&mut self, value: &PropertyValue) {
        self.entries
            .entry(value.prop_id)
            .and_modify(|e| {
                e.event_count += 1;
                e.last_event = value.clone();
            })
            .or_insert_with(|| EventLogEntry {
                prop_id: value.prop_id,
                event_count: 1,
                last_event: value.clone(),
            });
    }

    /// Count a set acknowledgement.
    pub fn record_set_ack(&mut self, value: &PropertyValue) {
        self.set_ack_count += 1;
        self.last_set_ack = Some(value.clone());
    }

    pub fn get(&self, prop_id: PropertyId) -> Option<&EventLogEntry> {
        self.entries.get(&prop_id)
    }

    pub fn set_ack_count(&self) -> u64 {
        self.set_ack_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.set_ack_count = 0;
        self.last_set_ack = None;
    }

    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Event log ({} properties):", self.entries.len())?;
        for entry in self.entries.values() {
            writeln!(
                out,
                "  {} count={} last=[{}]",
                PropId(entry.prop_id),
                entry.event_count,
                entry.last_event
            )?;
        }
        match &self.last_set_ack {
            Some(value) => writeln!(out, "  set acks={} last=[{}]", self.set_ack_count, value),
            None => writeln!(out, "  set acks=0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vprop_common::vhal::types::Value;

    #[test]
    fn counts_and_keeps_last() {
        let mut log = EventLog::new();
        log.record(&PropertyValue::new(10, 0, 1, Value::Int32(1)));
        log.record(&PropertyValue::new(10, 0, 2, Value::Int32(2)));
        log.record(&PropertyValue::new(11, 0, 3, Value::Bool(true)));

        let entry = log.get(10).unwrap();
        assert_eq!(entry.event_count, 2);
        assert_eq!(entry.last_event.value, Value::Int32(2));
        assert_eq!(log.len(), 2);

        log.record_set_ack(&PropertyValue::new(12, 0, 4, Value::Float(1.0)));
        assert_eq!(log.set_ack_count(), 1);

        let mut text = String::new();
        log.dump(&mut text).unwrap();
        assert!(text.contains("count=2"));
        assert!(text.contains("set acks=1"));

        log.clear();
        assert!(log.is_empty());
    }
}
