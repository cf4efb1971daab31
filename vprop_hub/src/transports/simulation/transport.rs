//! Simulated vehicle endpoint.
//!
//! `SimulatedTransport` implements `VehicleTransport` over a [`ValueStore`]
//! built from `properties.toml`. Callbacks are invoked on the thread calling
//! `set`, `inject` or `tick`, never while the internal lock is held.

use super::store::ValueStore;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use vprop_common::vhal::config::{PropertyTable, SimulationConfig};
use vprop_common::vhal::transport::{
    StatusCode, SubscribeOptions, TransportCallback, VehicleTransport,
};
use vprop_common::vhal::types::{
    ChangeMode, PropId, PropertyDescriptor, PropertyId, PropertyValue, SubscribeFlags,
    elapsed_realtime_nanos,
};

/// Slack when comparing elapsed time with a sample period, in seconds.
const PERIOD_EPSILON: f64 = 1e-6;

/// Call counters, for dumps and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub gets: u64,
    pub sets: u64,
    pub subscribes: u64,
    pub unsubscribes: u64,
    pub callbacks: u64,
}

#[derive(Debug, Clone, Copy)]
struct ActiveSubscription {
    options: SubscribeOptions,
    /// Simulated time since the last sample.
    since_sample: Duration,
}

struct SimState {
    store: ValueStore,
    subscriptions: BTreeMap<PropertyId, ActiveSubscription>,
    boot_try_again: u32,
    connected: bool,
    rejected_sets: HashSet<PropertyId>,
    stats: TransportStats,
}

/// Deliveries collected under the lock, sent after it is released.
enum Delivery {
    Changed(Vec<PropertyValue>),
    SetAck(PropertyValue),
    SetError(StatusCode, PropertyValue),
}

pub struct SimulatedTransport {
    state: Mutex<SimState>,
    callback: RwLock<Option<Arc<dyn TransportCallback>>>,
    tick_period: Duration,
}

impl SimulatedTransport {
    pub fn new(table: &PropertyTable, config: &SimulationConfig) -> Self {
        let store = ValueStore::from_table(table);
        info!(
            "Simulated transport with {} properties, tick {}ms, {} boot TRY_AGAIN replies",
            store.listed().len(),
            config.tick_ms,
            config.boot_try_again
        );
        Self {
            state: Mutex::new(SimState {
                store,
                subscriptions: BTreeMap::new(),
                boot_try_again: config.boot_try_again,
                connected: true,
                rejected_sets: HashSet::new(),
                stats: TransportStats::default(),
            }),
            callback: RwLock::new(None),
            tick_period: Duration::from_millis(config.tick_ms),
        }
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Advance simulated time by one tick period.
    ///
    /// Emits one value-changed callback holding every subscribed continuous
    /// property whose sample period elapsed. Returns the number of values sent.
    pub fn tick(&self) -> usize {
        self.advance(self.tick_period)
    }

    /// Advance simulated time by `dt`.
    pub fn advance(&self, dt: Duration) -> usize {
        let batch = {
            let mut state = self.state.lock();
            if !state.connected {
                return 0;
            }
            let now = elapsed_realtime_nanos();
            let mut due = Vec::new();
            for (prop_id, sub) in state.subscriptions.iter_mut() {
                sub.since_sample += dt;
                let rate = f64::from(sub.options.sample_rate_hz);
                if rate > 0.0 && sub.since_sample.as_secs_f64() + PERIOD_EPSILON < 1.0 / rate {
                    continue;
                }
                sub.since_sample = Duration::ZERO;
                due.push(*prop_id);
            }
            let mut batch = Vec::new();
            for prop_id in due {
                let continuous = state
                    .store
                    .descriptor(prop_id)
                    .is_some_and(|d| d.change_mode == ChangeMode::Continuous);
                if !continuous {
                    continue;
                }
                batch.extend(state.store.values_of(prop_id).into_iter().map(|mut v| {
                    v.timestamp = now;
                    v
                }));
            }
            batch
        };
        let sent = batch.len();
        if sent > 0 {
            self.deliver(Delivery::Changed(batch));
        }
        sent
    }

    /// Apply a vehicle-side change and report it if subscribed.
    ///
    /// All subscribed values go out in one callback, in the given order.
    pub fn inject(&self, values: Vec<PropertyValue>) -> Result<(), StatusCode> {
        let batch = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(StatusCode::NotAvailable);
            }
            let mut batch = Vec::with_capacity(values.len());
            for value in values {
                let desc = state.store.check_address(value.prop_id, value.area_id)?;
                if value.value.shape() != desc.shape {
                    return Err(StatusCode::InvalidArg);
                }
                let subscribed = state
                    .subscriptions
                    .get(&value.prop_id)
                    .is_some_and(|s| s.options.flags.contains(SubscribeFlags::EVENTS_FROM_CAR));
                state.store.put(value.clone());
                if subscribed {
                    batch.push(value);
                }
            }
            batch
        };
        if !batch.is_empty() {
            self.deliver(Delivery::Changed(batch));
        }
        Ok(())
    }

    /// Accept later sets of `prop_id` but fail them asynchronously.
    pub fn reject_sets(&self, prop_id: PropertyId) {
        self.state.lock().rejected_sets.insert(prop_id);
    }

    /// Drop the link. Every call fails with NOT_AVAILABLE and the endpoint
    /// forgets its subscriptions.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.subscriptions.clear();
        warn!("Simulated transport disconnected");
    }

    /// Restore the link. Subscriptions must be submitted again.
    pub fn reconnect(&self) {
        self.state.lock().connected = true;
        info!("Simulated transport reconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn subscription(&self, prop_id: PropertyId) -> Option<SubscribeOptions> {
        self.state
            .lock()
            .subscriptions
            .get(&prop_id)
            .map(|s| s.options)
    }

    pub fn subscribed_ids(&self) -> Vec<PropertyId> {
        self.state.lock().subscriptions.keys().copied().collect()
    }

    /// Stored value, bypassing access checks.
    pub fn peek(&self, prop_id: PropertyId, area_id: i32) -> Option<PropertyValue> {
        self.state.lock().store.get(prop_id, area_id).cloned()
    }

    pub fn stats(&self) -> TransportStats {
        self.state.lock().stats
    }

    fn deliver(&self, delivery: Delivery) {
        let Some(callback) = self.callback.read().clone() else {
            trace!("No callback installed, delivery dropped");
            return;
        };
        self.state.lock().stats.callbacks += 1;
        match delivery {
            Delivery::Changed(values) => callback.on_values_changed(values),
            Delivery::SetAck(value) => callback.on_value_set_ack(value),
            Delivery::SetError(status, value) => {
                callback.on_value_set_error(status, value.prop_id, value.area_id)
            }
        }
    }

    /// Shared precondition of get and set: link up and boot finished.
    fn ready(state: &mut SimState) -> Result<(), StatusCode> {
        if !state.connected {
            return Err(StatusCode::NotAvailable);
        }
        if state.boot_try_again > 0 {
            state.boot_try_again -= 1;
            return Err(StatusCode::TryAgain);
        }
        Ok(())
    }
}

impl VehicleTransport for SimulatedTransport {
    fn set_callback(&self, callback: Arc<dyn TransportCallback>) {
        *self.callback.write() = Some(callback);
    }

    fn fetch_all_descriptors(&self) -> Result<Vec<PropertyDescriptor>, StatusCode> {
        let state = self.state.lock();
        if !state.connected {
            return Err(StatusCode::NotAvailable);
        }
        Ok(state.store.listed().to_vec())
    }

    fn get(&self, request: &PropertyValue) -> Result<PropertyValue, StatusCode> {
        let mut state = self.state.lock();
        state.stats.gets += 1;
        Self::ready(&mut state)?;
        let desc = state.store.check_address(request.prop_id, request.area_id)?;
        if !desc.access.is_readable() {
            return Err(StatusCode::AccessDenied);
        }
        state
            .store
            .get(request.prop_id, request.area_id)
            .cloned()
            .ok_or(StatusCode::InternalError)
    }

    fn set(&self, value: &PropertyValue) -> StatusCode {
        let deliveries = {
            let mut state = self.state.lock();
            state.stats.sets += 1;
            if let Err(status) = Self::ready(&mut state) {
                return status;
            }
            let desc = match state.store.check_address(value.prop_id, value.area_id) {
                Ok(desc) => desc.clone(),
                Err(status) => return status,
            };
            if !desc.access.is_writable() {
                return StatusCode::AccessDenied;
            }
            if value.value.shape() != desc.shape {
                return StatusCode::InvalidArg;
            }
            if state.rejected_sets.contains(&value.prop_id) {
                debug!(prop = %PropId(value.prop_id), "Set accepted, failing asynchronously");
                vec![Delivery::SetError(StatusCode::InternalError, value.clone())]
            } else {
                let mut stored = value.clone();
                stored.timestamp = elapsed_realtime_nanos();
                let changed = state.store.put(stored.clone());
                let echo = state.subscriptions.get(&value.prop_id).is_some_and(|s| {
                    desc.change_mode == ChangeMode::OnSet
                        || (changed && desc.change_mode == ChangeMode::OnChange)
                        || s.options.flags.contains(SubscribeFlags::EVENTS_FROM_ANDROID)
                });
                let mut deliveries = vec![Delivery::SetAck(stored.clone())];
                if echo {
                    deliveries.push(Delivery::Changed(vec![stored]));
                }
                deliveries
            }
        };
        for delivery in deliveries {
            self.deliver(delivery);
        }
        StatusCode::Ok
    }

    fn subscribe(&self, options: &[SubscribeOptions]) -> StatusCode {
        let mut state = self.state.lock();
        state.stats.subscribes += 1;
        if !state.connected {
            return StatusCode::NotAvailable;
        }
        for option in options {
            let Some(desc) = state.store.descriptor(option.prop_id) else {
                return StatusCode::InvalidArg;
            };
            if !desc.access.is_readable() || desc.change_mode == ChangeMode::Static {
                return StatusCode::InvalidArg;
            }
        }
        for option in options {
            state.subscriptions.insert(
                option.prop_id,
                ActiveSubscription {
                    options: *option,
                    since_sample: Duration::ZERO,
                },
            );
        }
        StatusCode::Ok
    }

    fn unsubscribe(&self, prop_id: PropertyId) -> StatusCode {
        let mut state = self.state.lock();
        state.stats.unsubscribes += 1;
        if !state.connected {
            return StatusCode::NotAvailable;
        }
        match state.subscriptions.remove(&prop_id) {
            Some(_) => StatusCode::Ok,
            None => StatusCode::InvalidArg,
        }
    }
}
