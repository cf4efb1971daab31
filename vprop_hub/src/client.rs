//! Transport client.
//!
//! Synchronous wrapper around a `VehicleTransport`:
//! - get/set retried while the endpoint answers TRY_AGAIN, within a wall-clock budget
//! - terminal statuses converted to `VhalError`
//! - subscribe/unsubscribe failures logged, never returned
//! - asynchronous deliveries forwarded to the dispatch queue

use crate::dispatch::{DispatchQueue, TransportEvent};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use vprop_common::vhal::config::RetryConfig;
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::transport::{
    StatusCode, SubscribeOptions, TransportCallback, VehicleTransport,
};
use vprop_common::vhal::types::{
    AreaId, PropId, PropertyDescriptor, PropertyId, PropertyValue, SubscribeFlags,
};

/// Retry budget for synchronous calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total wall-clock budget across all attempts.
    pub timeout: Duration,
    /// Sleep between two attempts.
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Forwards transport callbacks onto the dispatch queue.
struct QueueingCallback {
    queue: DispatchQueue,
}

impl TransportCallback for QueueingCallback {
    fn on_values_changed(&self, values: Vec<PropertyValue>) {
        trace!("Queueing {} changed values", values.len());
        self.queue.post(TransportEvent::ValuesChanged(values));
    }

    fn on_value_set_ack(&self, value: PropertyValue) {
        self.queue.post(TransportEvent::SetAck(value));
    }

    fn on_value_set_error(&self, status: StatusCode, prop_id: PropertyId, area_id: AreaId) {
        self.queue.post(TransportEvent::SetError {
            status,
            prop_id,
            area_id,
        });
    }
}

/// Synchronous client of one transport instance.
pub struct TransportClient {
    transport: Arc<dyn VehicleTransport>,
    retry: RetryPolicy,
}

impl TransportClient {
    /// Wrap `transport` and route its callbacks to `queue`.
    pub fn new(transport: Arc<dyn VehicleTransport>, retry: RetryPolicy, queue: DispatchQueue) -> Self {
        transport.set_callback(Arc::new(QueueingCallback { queue }));
        Self { transport, retry }
    }

    /// Fetch every descriptor once.
    ///
    /// # Errors
    /// Returns `VhalError::TransportUnavailable` on any transport failure.
    pub fn get_all_descriptors(&self) -> Result<Vec<PropertyDescriptor>, VhalError> {
        self.transport
            .fetch_all_descriptors()
            .map_err(|status| {
                VhalError::TransportUnavailable(format!(
                    "fetching property descriptors failed with {status:?}"
                ))
            })
    }

    /// Synchronous read with retry on TRY_AGAIN.
    pub fn get_value(&self, request: &PropertyValue) -> Result<PropertyValue, VhalError> {
        self.with_retry(request.prop_id, "get", || self.transport.get(request))
    }

    /// Synchronous write with retry on TRY_AGAIN.
    pub fn set_value(&self, value: &PropertyValue) -> Result<(), VhalError> {
        self.with_retry(value.prop_id, "set", || match self.transport.set(value) {
            StatusCode::Ok => Ok(()),
            status => Err(status),
        })
    }

    /// Subscribe one property. Failures are logged only.
    pub fn subscribe(&self, prop_id: PropertyId, sample_rate_hz: f32, flags: SubscribeFlags) {
        let options = [SubscribeOptions {
            prop_id,
            sample_rate_hz,
            flags,
        }];
        match self.transport.subscribe(&options) {
            StatusCode::Ok => debug!(
                prop = %PropId(prop_id),
                "Subscribed at {sample_rate_hz} Hz ({flags:?})"
            ),
            status => warn!(prop = %PropId(prop_id), "Subscribe failed: {status:?}"),
        }
    }

    /// Unsubscribe one property. Failures are logged only.
    pub fn unsubscribe(&self, prop_id: PropertyId) {
        match self.transport.unsubscribe(prop_id) {
            StatusCode::Ok => debug!(prop = %PropId(prop_id), "Unsubscribed"),
            status => warn!(prop = %PropId(prop_id), "Unsubscribe failed: {status:?}"),
        }
    }

    fn with_retry<T>(
        &self,
        prop_id: PropertyId,
        op_name: &str,
        mut op: impl FnMut() -> Result<T, StatusCode>,
    ) -> Result<T, VhalError> {
        let start = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match op() {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(
                            prop = %PropId(prop_id),
                            "{op_name} succeeded after {attempts} attempts"
                        );
                    }
                    return Ok(value);
                }
                Err(StatusCode::TryAgain) => {
                    let elapsed = start.elapsed();
                    if elapsed >= self.retry.timeout {
                        warn!(
                            prop = %PropId(prop_id),
                            "{op_name} timed out after {attempts} attempts ({}ms)",
                            elapsed.as_millis()
                        );
                        return Err(VhalError::PropertyTimeout(prop_id));
                    }
                    let remaining = self.retry.timeout - elapsed;
                    thread::sleep(self.retry.poll_interval.min(remaining));
                }
                Err(StatusCode::InvalidArg) => {
                    return Err(VhalError::InvalidProperty(prop_id));
                }
                Err(status) => {
                    warn!(prop = %PropId(prop_id), "{op_name} failed: {status:?}");
                    return Err(VhalError::TransportError(status));
                }
            }
        }
    }
}
