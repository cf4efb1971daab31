//! Dispatch thread.
//!
//! Every asynchronous delivery from the transport is posted to a queue and
//! handled on one dedicated thread, so the transport's own thread never runs
//! handler code and deliveries never overlap.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, info, trace};
use vprop_common::vhal::consts::DISPATCH_THREAD_NAME;
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::transport::StatusCode;
use vprop_common::vhal::types::{AreaId, PropertyId, PropertyValue};

/// One asynchronous delivery from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A raw value-changed callback, in transport order.
    ValuesChanged(Vec<PropertyValue>),
    /// A set call was acknowledged.
    SetAck(PropertyValue),
    /// A set call failed on the vehicle side.
    SetError {
        status: StatusCode,
        prop_id: PropertyId,
        area_id: AreaId,
    },
}

enum DispatchMessage {
    Event(TransportEvent),
    Stop,
}

/// Receiver of events on the dispatch thread.
pub trait EventSink: Send + Sync + 'static {
    fn handle_event(&self, event: TransportEvent);
}

/// Sending half of the dispatch queue. Cheap to clone.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: Sender<DispatchMessage>,
}

impl DispatchQueue {
    /// Post an event. Returns immediately.
    pub fn post(&self, event: TransportEvent) {
        if self.tx.send(DispatchMessage::Event(event)).is_err() {
            trace!("Dispatch thread stopped, event dropped");
        }
    }
}

/// Receiving half, consumed when the dispatch thread starts.
pub struct DispatchReceiver {
    rx: Receiver<DispatchMessage>,
}

/// Create a dispatch queue. The queue can be handed out before the thread runs.
pub fn channel() -> (DispatchQueue, DispatchReceiver) {
    let (tx, rx) = mpsc::channel();
    (DispatchQueue { tx }, DispatchReceiver { rx })
}

/// Owner of the dispatch thread.
pub struct DispatchLoop {
    queue: DispatchQueue,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl DispatchLoop {
    /// Start the dispatch thread delivering everything posted to `queue` to `sink`.
    ///
    /// # Errors
    /// Returns `VhalError::InvalidState` if the OS refuses to spawn the thread.
    pub fn spawn(
        queue: DispatchQueue,
        receiver: DispatchReceiver,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, VhalError> {
        let handle = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || run(receiver, sink))
            .map_err(|e| VhalError::InvalidState(format!("cannot spawn dispatch thread: {e}")))?;
        let thread_id = handle.thread().id();
        info!("Dispatch thread '{}' started", DISPATCH_THREAD_NAME);

        Ok(Self {
            queue,
            handle: Some(handle),
            thread_id,
        })
    }

    /// True when called from the dispatch thread itself.
    pub fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Stop the thread after it drained everything queued before this call.
    ///
    /// Does not join when called from the dispatch thread.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.queue.tx.send(DispatchMessage::Stop);
        if self.is_dispatch_thread() {
            debug!("Dispatch thread stopping itself, not joining");
            return;
        }
        if handle.join().is_err() {
            debug!("Dispatch thread ended with a panic");
        }
        info!("Dispatch thread stopped");
    }
}

impl Drop for DispatchLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(receiver: DispatchReceiver, sink: Arc<dyn EventSink>) {
    while let Ok(message) = receiver.rx.recv() {
        match message {
            DispatchMessage::Event(event) => sink.handle_event(event),
            DispatchMessage::Stop => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use vprop_common::vhal::types::Value;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<(TransportEvent, String)>>,
    }

    impl EventSink for RecordingSink {
        fn handle_event(&self, event: TransportEvent) {
            let name = thread::current().name().unwrap_or_default().to_string();
            self.events.lock().push((event, name));
        }
    }

    fn value(id: PropertyId) -> PropertyValue {
        PropertyValue::new(id, 0, 0, Value::Int32(id))
    }

    #[test]
    fn delivers_in_order_on_named_thread() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, receiver) = channel();
        let mut dispatch = DispatchLoop::spawn(queue.clone(), receiver, sink.clone()).unwrap();

        queue.post(TransportEvent::ValuesChanged(vec![value(1)]));
        queue.post(TransportEvent::SetAck(value(2)));
        queue.post(TransportEvent::SetError {
            status: StatusCode::InternalError,
            prop_id: 3,
            area_id: 0,
        });
        dispatch.stop();

        let events = sink.events.lock();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0].0, TransportEvent::ValuesChanged(_)));
        assert!(matches!(events[1].0, TransportEvent::SetAck(_)));
        assert!(matches!(events[2].0, TransportEvent::SetError { prop_id: 3, .. }));
        assert!(events.iter().all(|(_, name)| name == DISPATCH_THREAD_NAME));
    }

    #[test]
    fn post_after_stop_is_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, receiver) = channel();
        let mut dispatch = DispatchLoop::spawn(queue.clone(), receiver, sink.clone()).unwrap();
        dispatch.stop();
        dispatch.stop();

        queue.post(TransportEvent::ValuesChanged(vec![value(1)]));
        assert!(sink.events.lock().is_empty());
        assert!(!dispatch.is_dispatch_thread());
    }
}
