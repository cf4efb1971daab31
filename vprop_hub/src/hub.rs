//! Dispatch hub.
//!
//! `VehicleHub` owns the property → handler claims, the subscription table
//! and the registry, runs claim arbitration at init, and fans transport
//! events out to handlers on the dispatch thread.
//!
//! # Locking
//!
//! Claims, subscriptions, registry and lifecycle state live under one coarse
//! lock (`HubInner`). Lock order is handler → inner → client; the inner lock
//! is never held while a handler callback runs.
//!
//! Events posted while `init()` runs stay queued: the dispatch thread waits
//! until the hub leaves `Initializing`, then delivers them in arrival order.

use crate::client::{RetryPolicy, TransportClient};
use crate::dispatch::{self, DispatchLoop, DispatchQueue, EventSink, TransportEvent};
use crate::event_log::{EventLog, EventLogEntry};
use crate::registry::PropertyRegistry;
use parking_lot::{Condvar, Mutex, RwLock};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use vprop_common::vhal::error::VhalError;
use vprop_common::vhal::handler::{HubContext, PropertyHandler};
use vprop_common::vhal::transport::{StatusCode, VehicleTransport};
use vprop_common::vhal::types::{
    AreaId, PropId, PropertyDescriptor, PropertyId, PropertyValue, SubscribeFlags,
};

/// How long `dump()` waits for a busy handler.
const DUMP_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Hub lifecycle.
///
/// `Uninitialized → Initializing → Running → Releasing → Released`.
/// A failed init returns to `Uninitialized`. Releasing a hub that never
/// initialized moves it from `Uninitialized` to `Released` without handler
/// callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Uninitialized,
    Initializing,
    Running,
    Releasing,
    Released,
}

impl fmt::Display for HubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Releasing => "releasing",
            Self::Released => "released",
        };
        f.write_str(s)
    }
}

/// One active subscription.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionEntry {
    pub prop_id: PropertyId,
    pub sample_rate_hz: f32,
    pub flags: SubscribeFlags,
}

struct HandlerSlot {
    name: &'static str,
    handler: Mutex<Box<dyn PropertyHandler>>,
}

/// State guarded by the coarse hub lock.
struct HubInner {
    state: HubState,
    registry: Arc<PropertyRegistry>,
    /// Property → index into `HubShared::handlers`.
    claims: HashMap<PropertyId, usize>,
    subscriptions: BTreeMap<PropertyId, SubscriptionEntry>,
    event_log: EventLog,
    /// Number of handlers whose `on_init` ran, in priority order.
    initialized_handlers: usize,
}

/// State shared between the hub, the dispatch thread and handler contexts.
struct HubShared {
    inner: Mutex<HubInner>,
    /// Signalled when the hub leaves `Initializing`.
    init_settled: Condvar,
    client: RwLock<Arc<TransportClient>>,
    handlers: Vec<HandlerSlot>,
    queue: DispatchQueue,
    retry: RetryPolicy,
}

/// Central dispatcher between one transport and the domain handlers.
///
/// Handlers are given in priority order: claims are offered and `on_init`
/// runs in that order, `on_release` in the reverse order.
pub struct VehicleHub {
    shared: Arc<HubShared>,
    dispatcher: Mutex<Option<DispatchLoop>>,
}

impl VehicleHub {
    /// Create a hub over `transport` with `handlers` in priority order.
    ///
    /// Starts the dispatch thread. No transport call is made until `init()`.
    ///
    /// # Errors
    /// Returns `VhalError::ConfigError` if two handlers share a name.
    pub fn new(
        transport: Arc<dyn VehicleTransport>,
        handlers: Vec<Box<dyn PropertyHandler>>,
        retry: RetryPolicy,
    ) -> Result<Self, VhalError> {
        let mut names = HashSet::new();
        for handler in &handlers {
            if !names.insert(handler.name()) {
                return Err(VhalError::ConfigError(format!(
                    "handler '{}' registered twice",
                    handler.name()
                )));
            }
        }

        let (queue, receiver) = dispatch::channel();
        let client = TransportClient::new(transport, retry, queue.clone());
        let handlers: Vec<HandlerSlot> = handlers
            .into_iter()
            .map(|handler| HandlerSlot {
                name: handler.name(),
                handler: Mutex::new(handler),
            })
            .collect();

        info!(
            "VehicleHub created with {} handlers: {:?}, retry budget {}ms / {}ms",
            handlers.len(),
            handlers.iter().map(|s| s.name).collect::<Vec<_>>(),
            retry.timeout.as_millis(),
            retry.poll_interval.as_millis()
        );

        let shared = Arc::new(HubShared {
            inner: Mutex::new(HubInner {
                state: HubState::Uninitialized,
                registry: Arc::new(PropertyRegistry::empty()),
                claims: HashMap::new(),
                subscriptions: BTreeMap::new(),
                event_log: EventLog::new(),
                initialized_handlers: 0,
            }),
            init_settled: Condvar::new(),
            client: RwLock::new(Arc::new(client)),
            handlers,
            queue: queue.clone(),
            retry,
        });
        let dispatcher = DispatchLoop::spawn(queue, receiver, shared.clone())?;

        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Fetch descriptors, arbitrate claims, subscribe, and initialize handlers.
    ///
    /// # Errors
    /// - `VhalError::InvalidState` if called more than once
    /// - `VhalError::TransportUnavailable` if descriptors cannot be fetched
    /// - `VhalError::DuplicateProperty` if the transport reports an id twice
    ///
    /// On error the hub returns to `Uninitialized` without touching any handler
    /// beyond `claim_properties`.
    pub fn init(&self) -> Result<(), VhalError> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.state != HubState::Uninitialized {
                return Err(VhalError::InvalidState(format!(
                    "init called while hub is {}",
                    inner.state
                )));
            }
            inner.state = HubState::Initializing;
        }
        info!("Initializing VehicleHub...");

        if let Err(e) = self.shared.claim_and_subscribe() {
            error!("VehicleHub initialization failed: {e}");
            self.shared.reset_after_failed_init();
            return Err(e);
        }
        self.shared.init_handlers();

        let mut inner = self.shared.inner.lock();
        inner.state = HubState::Running;
        self.shared.init_settled.notify_all();
        info!(
            "VehicleHub running: {} properties, {} claimed, {} subscribed",
            inner.registry.len(),
            inner.claims.len(),
            inner.subscriptions.len()
        );
        Ok(())
    }

    /// Release handlers in reverse priority order, unsubscribe everything and
    /// clear claims and registry.
    ///
    /// Idempotent. Ignored while `init()` is still running. Must not be called
    /// from inside a handler callback.
    pub fn release(&self) {
        let initialized = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                HubState::Releasing | HubState::Released => {
                    debug!("Release ignored: hub already {}", inner.state);
                    return;
                }
                HubState::Initializing => {
                    warn!("Release ignored: initialization in progress");
                    return;
                }
                HubState::Uninitialized => {
                    inner.state = HubState::Released;
                    None
                }
                HubState::Running => {
                    inner.state = HubState::Releasing;
                    Some(inner.initialized_handlers)
                }
            }
        };

        if let Some(mut dispatcher) = self.dispatcher.lock().take() {
            dispatcher.stop();
        }
        let Some(initialized) = initialized else {
            info!("VehicleHub released before init");
            return;
        };
        info!("Releasing VehicleHub...");

        for idx in (0..initialized).rev() {
            self.shared.deliver(idx, "on_release", |h| h.on_release());
        }

        let client = self.shared.client();
        let mut inner = self.shared.inner.lock();
        for prop_id in inner.subscriptions.keys() {
            client.unsubscribe(*prop_id);
        }
        inner.subscriptions.clear();
        inner.claims.clear();
        inner.event_log.clear();
        inner.registry = Arc::new(PropertyRegistry::empty());
        inner.initialized_handlers = 0;
        inner.state = HubState::Released;
        info!("VehicleHub released");
    }

    /// Swap in a reconnected transport and resubmit every active subscription.
    ///
    /// Resubscription is best-effort: failures are logged by the client and do
    /// not stop the remaining entries.
    ///
    /// # Errors
    /// Returns `VhalError::InvalidState` unless the hub is running.
    pub fn on_transport_reconnected(
        &self,
        transport: Arc<dyn VehicleTransport>,
    ) -> Result<(), VhalError> {
        let inner = self.shared.inner.lock();
        if inner.state != HubState::Running {
            return Err(VhalError::InvalidState(format!(
                "reconnect while hub is {}",
                inner.state
            )));
        }

        let client = Arc::new(TransportClient::new(
            transport,
            self.shared.retry,
            self.shared.queue.clone(),
        ));
        *self.shared.client.write() = client.clone();

        info!(
            "Transport reconnected, resubscribing {} properties",
            inner.subscriptions.len()
        );
        for entry in inner.subscriptions.values() {
            client.subscribe(entry.prop_id, entry.sample_rate_hz, entry.flags);
        }
        Ok(())
    }

    /// Synchronous read, validated against the registry.
    pub fn get_value(&self, request: &PropertyValue) -> Result<PropertyValue, VhalError> {
        self.shared.get_value(request)
    }

    /// Synchronous write, validated against the registry.
    pub fn set_value(&self, value: &PropertyValue) -> Result<(), VhalError> {
        self.shared.set_value(value)
    }

    pub fn state(&self) -> HubState {
        self.shared.inner.lock().state
    }

    /// Frozen registry snapshot.
    pub fn registry(&self) -> Arc<PropertyRegistry> {
        self.shared.registry()
    }

    /// Handler names in priority order.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.shared.handlers.iter().map(|s| s.name).collect()
    }

    /// Name of the handler owning `prop_id`.
    pub fn owner_of(&self, prop_id: PropertyId) -> Option<&'static str> {
        let inner = self.shared.inner.lock();
        inner
            .claims
            .get(&prop_id)
            .map(|idx| self.shared.handlers[*idx].name)
    }

    /// Properties claimed by `handler`, ordered by id.
    pub fn claims_of(&self, handler: &str) -> Vec<PropertyId> {
        let Some(owner) = self.shared.handlers.iter().position(|s| s.name == handler) else {
            return Vec::new();
        };
        let inner = self.shared.inner.lock();
        let mut ids: Vec<_> = inner
            .claims
            .iter()
            .filter(|(_, idx)| **idx == owner)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Active subscriptions ordered by id.
    pub fn subscriptions(&self) -> Vec<SubscriptionEntry> {
        self.shared.inner.lock().subscriptions.values().copied().collect()
    }

    /// Event log entry of one property.
    pub fn event_log_entry(&self, prop_id: PropertyId) -> Option<EventLogEntry> {
        self.shared.inner.lock().event_log.get(prop_id).cloned()
    }

    /// Number of set acknowledgements received.
    pub fn set_ack_count(&self) -> u64 {
        self.shared.inner.lock().event_log.set_ack_count()
    }

    /// Human-readable state of the hub and every handler.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if let Err(e) = self.shared.dump(&mut out) {
            warn!("Dump truncated: {e}");
        }
        out
    }
}

impl Drop for VehicleHub {
    fn drop(&mut self) {
        self.release();
    }
}

impl HubShared {
    fn client(&self) -> Arc<TransportClient> {
        self.client.read().clone()
    }

    fn registry(&self) -> Arc<PropertyRegistry> {
        self.inner.lock().registry.clone()
    }

    /// Init steps 1-4: fetch, registry, claim arbitration, subscriptions.
    fn claim_and_subscribe(&self) -> Result<(), VhalError> {
        let client = self.client();
        let descriptors = client.get_all_descriptors()?;
        let registry = Arc::new(PropertyRegistry::initialize(descriptors)?);
        info!("Registry initialized with {} properties", registry.len());

        let mut remaining = registry.descriptors();
        let mut claims = HashMap::new();
        for (idx, slot) in self.handlers.iter().enumerate() {
            let offered: HashSet<PropertyId> = remaining.iter().map(|d| d.id).collect();
            // a panicking handler claims nothing
            let returned = self
                .deliver(idx, "claim_properties", |h| h.claim_properties(&remaining))
                .unwrap_or_default();

            let mut accepted = HashSet::new();
            for desc in returned {
                if !offered.contains(&desc.id) {
                    warn!(
                        handler = slot.name,
                        prop = %PropId(desc.id),
                        "Claim of a property that was not offered ignored"
                    );
                    continue;
                }
                if accepted.insert(desc.id) {
                    claims.insert(desc.id, idx);
                }
            }
            remaining.retain(|d| !accepted.contains(&d.id));
            info!(handler = slot.name, "Claimed {} properties", accepted.len());
        }
        if !remaining.is_empty() {
            debug!("{} properties left unclaimed", remaining.len());
        }

        let mut inner = self.inner.lock();
        let mut claimed: Vec<PropertyId> = claims.keys().copied().collect();
        claimed.sort_unstable();
        inner.registry = registry.clone();
        inner.claims = claims;

        for prop_id in claimed {
            let Some(desc) = registry.lookup(prop_id) else {
                continue;
            };
            if !PropertyRegistry::is_subscribable(&desc) {
                trace!(prop = %PropId(prop_id), "Not subscribable, skipped");
                continue;
            }
            let entry = SubscriptionEntry {
                prop_id,
                sample_rate_hz: desc.clamp_sample_rate(0.0),
                flags: SubscribeFlags::default(),
            };
            client.subscribe(prop_id, entry.sample_rate_hz, entry.flags);
            inner.subscriptions.insert(prop_id, entry);
        }
        Ok(())
    }

    /// Init step 5: `on_init` in priority order.
    fn init_handlers(self: &Arc<Self>) {
        for (idx, slot) in self.handlers.iter().enumerate() {
            let ctx: Arc<dyn HubContext> = Arc::new(HandlerContext {
                shared: Arc::downgrade(self),
                owner: idx,
                name: slot.name,
            });
            self.deliver(idx, "on_init", move |h| h.on_init(ctx));
            self.inner.lock().initialized_handlers = idx + 1;
        }
    }

    fn reset_after_failed_init(&self) {
        let mut inner = self.inner.lock();
        inner.registry = Arc::new(PropertyRegistry::empty());
        inner.claims.clear();
        inner.subscriptions.clear();
        inner.state = HubState::Uninitialized;
        self.init_settled.notify_all();
    }

    /// Block the dispatch thread while `init()` is running.
    fn wait_for_init(&self) {
        let mut inner = self.inner.lock();
        while inner.state == HubState::Initializing {
            self.init_settled.wait(&mut inner);
        }
    }

    /// Run one handler callback, isolating panics. `None` if it panicked.
    fn deliver<R>(
        &self,
        idx: usize,
        what: &str,
        f: impl FnOnce(&mut dyn PropertyHandler) -> R,
    ) -> Option<R> {
        let slot = &self.handlers[idx];
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut handler = slot.handler.lock();
            f(&mut **handler)
        }));
        match result {
            Ok(value) => Some(value),
            Err(payload) => {
                error!(
                    handler = slot.name,
                    "{what} panicked: {}",
                    panic_message(payload.as_ref())
                );
                None
            }
        }
    }

    fn dispatch_values(&self, values: Vec<PropertyValue>) {
        let mut batches: Vec<Vec<PropertyValue>> = vec![Vec::new(); self.handlers.len()];
        {
            let mut inner = self.inner.lock();
            if inner.state != HubState::Running {
                debug!("Dropping {} values: hub is {}", values.len(), inner.state);
                return;
            }
            for value in values {
                let Some(&idx) = inner.claims.get(&value.prop_id) else {
                    warn!(
                        prop = %PropId(value.prop_id),
                        "Event for unmapped property dropped"
                    );
                    continue;
                };
                inner.event_log.record(&value);
                batches[idx].push(value);
            }
        }

        for (idx, batch) in batches.into_iter().enumerate() {
            if batch.is_empty() {
                continue;
            }
            trace!(handler = self.handlers[idx].name, "Delivering {} values", batch.len());
            self.deliver(idx, "on_event_batch", move |h| h.on_event_batch(batch));
        }
    }

    fn dispatch_set_error(&self, status: StatusCode, prop_id: PropertyId, area_id: AreaId) {
        let owner = {
            let inner = self.inner.lock();
            if inner.state != HubState::Running {
                return;
            }
            inner.claims.get(&prop_id).copied()
        };
        warn!(
            prop = %PropId(prop_id),
            "Set error {status:?} for area {area_id:#x}"
        );
        match owner {
            Some(idx) => {
                self.deliver(idx, "on_set_error", |h| h.on_set_error(prop_id, area_id));
            }
            None => warn!(prop = %PropId(prop_id), "Set error for unmapped property dropped"),
        }
    }

    fn lookup_for_call(&self, prop_id: PropertyId, area_id: AreaId) -> Result<Arc<PropertyDescriptor>, VhalError> {
        let desc = self
            .registry()
            .lookup(prop_id)
            .ok_or(VhalError::InvalidProperty(prop_id))?;
        if !desc.has_area(area_id) {
            return Err(VhalError::InvalidArgument(format!(
                "property {} has no area {area_id:#x}",
                PropId(prop_id)
            )));
        }
        Ok(desc)
    }

    fn get_value(&self, request: &PropertyValue) -> Result<PropertyValue, VhalError> {
        let desc = self.lookup_for_call(request.prop_id, request.area_id)?;
        if !desc.access.is_readable() {
            return Err(VhalError::InvalidArgument(format!(
                "property {} is not readable",
                PropId(desc.id)
            )));
        }
        self.client().get_value(request)
    }

    fn set_value(&self, value: &PropertyValue) -> Result<(), VhalError> {
        let desc = self.lookup_for_call(value.prop_id, value.area_id)?;
        if !desc.access.is_writable() {
            return Err(VhalError::InvalidArgument(format!(
                "property {} is not writable",
                PropId(desc.id)
            )));
        }
        if value.value.shape() != desc.shape {
            return Err(VhalError::InvalidArgument(format!(
                "property {} expects {} but got {}",
                PropId(desc.id),
                desc.shape,
                value.value.shape()
            )));
        }
        self.client().set_value(value)
    }

    fn subscribe(
        &self,
        owner: usize,
        prop_id: PropertyId,
        sample_rate_hz: f32,
        flags: SubscribeFlags,
    ) -> Result<(), VhalError> {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, HubState::Initializing | HubState::Running) {
            return Err(VhalError::InvalidState(format!(
                "subscribe while hub is {}",
                inner.state
            )));
        }
        let desc = inner
            .registry
            .lookup(prop_id)
            .ok_or(VhalError::InvalidProperty(prop_id))?;
        if !PropertyRegistry::is_subscribable(&desc) {
            return Err(VhalError::NotSubscribable(prop_id));
        }
        if inner.claims.get(&prop_id) != Some(&owner) {
            return Err(VhalError::NotOwned {
                prop_id,
                handler: self.handlers[owner].name,
            });
        }

        let entry = SubscriptionEntry {
            prop_id,
            sample_rate_hz: desc.clamp_sample_rate(sample_rate_hz),
            flags,
        };
        if inner.subscriptions.get(&prop_id) == Some(&entry) {
            trace!(prop = %PropId(prop_id), "Subscription unchanged");
            return Ok(());
        }
        self.client()
            .subscribe(prop_id, entry.sample_rate_hz, entry.flags);
        inner.subscriptions.insert(prop_id, entry);
        Ok(())
    }

    fn unsubscribe(&self, owner: usize, prop_id: PropertyId) -> Result<(), VhalError> {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, HubState::Initializing | HubState::Running) {
            return Err(VhalError::InvalidState(format!(
                "unsubscribe while hub is {}",
                inner.state
            )));
        }
        if inner.registry.lookup(prop_id).is_none() {
            return Err(VhalError::InvalidProperty(prop_id));
        }
        if inner.claims.get(&prop_id) != Some(&owner) {
            return Err(VhalError::NotOwned {
                prop_id,
                handler: self.handlers[owner].name,
            });
        }
        if inner.subscriptions.remove(&prop_id).is_some() {
            self.client().unsubscribe(prop_id);
        } else {
            debug!(prop = %PropId(prop_id), "Unsubscribe of inactive property ignored");
        }
        Ok(())
    }

    fn dump(&self, out: &mut String) -> fmt::Result {
        {
            let inner = self.inner.lock();
            writeln!(out, "**VehicleHub** state={}", inner.state)?;
            writeln!(out, "Properties: {}", inner.registry.len())?;
            for (idx, slot) in self.handlers.iter().enumerate() {
                let mut ids: Vec<_> = inner
                    .claims
                    .iter()
                    .filter(|(_, owner)| **owner == idx)
                    .map(|(id, _)| *id)
                    .collect();
                ids.sort_unstable();
                let ids: Vec<String> = ids.iter().map(|id| PropId(*id).to_string()).collect();
                writeln!(
                    out,
                    "Handler {} claims {}: [{}]",
                    slot.name,
                    ids.len(),
                    ids.join(", ")
                )?;
            }
            writeln!(out, "Subscriptions ({}):", inner.subscriptions.len())?;
            for entry in inner.subscriptions.values() {
                writeln!(
                    out,
                    "  {} rate={}Hz flags={:?}",
                    PropId(entry.prop_id),
                    entry.sample_rate_hz,
                    entry.flags
                )?;
            }
            inner.event_log.dump(out)?;
        }

        for slot in &self.handlers {
            writeln!(out, "**{}**", slot.name)?;
            match slot.handler.try_lock_for(DUMP_LOCK_TIMEOUT) {
                Some(handler) => handler.dump(out)?,
                None => writeln!(out, "  <busy>")?,
            }
        }
        Ok(())
    }
}

impl EventSink for HubShared {
    fn handle_event(&self, event: TransportEvent) {
        self.wait_for_init();
        match event {
            TransportEvent::ValuesChanged(values) => self.dispatch_values(values),
            TransportEvent::SetAck(value) => {
                trace!("Set acknowledged: {value}");
                self.inner.lock().event_log.record_set_ack(&value);
            }
            TransportEvent::SetError {
                status,
                prop_id,
                area_id,
            } => self.dispatch_set_error(status, prop_id, area_id),
        }
    }
}

/// Hub services scoped to one handler.
struct HandlerContext {
    shared: Weak<HubShared>,
    owner: usize,
    name: &'static str,
}

impl HandlerContext {
    fn shared(&self) -> Result<Arc<HubShared>, VhalError> {
        self.shared
            .upgrade()
            .ok_or_else(|| VhalError::InvalidState(format!("hub of handler '{}' is gone", self.name)))
    }
}

impl HubContext for HandlerContext {
    fn subscribe(
        &self,
        prop_id: PropertyId,
        sample_rate_hz: f32,
        flags: SubscribeFlags,
    ) -> Result<(), VhalError> {
        self.shared()?
            .subscribe(self.owner, prop_id, sample_rate_hz, flags)
    }

    fn unsubscribe(&self, prop_id: PropertyId) -> Result<(), VhalError> {
        self.shared()?.unsubscribe(self.owner, prop_id)
    }

    fn get_value(&self, request: &PropertyValue) -> Result<PropertyValue, VhalError> {
        self.shared()?.get_value(request)
    }

    fn set_value(&self, value: &PropertyValue) -> Result<(), VhalError> {
        self.shared()?.set_value(value)
    }

    fn descriptor(&self, prop_id: PropertyId) -> Option<Arc<PropertyDescriptor>> {
        self.shared().ok()?.registry().lookup(prop_id)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
