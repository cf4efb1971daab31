//! Shared fixtures for hub integration tests.
//!
//! `MockTransport` records every call and lets a test inject callbacks and
//! script replies. `TestHandler` claims a fixed id set and records what it
//! receives into a `HandlerLog`.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use vprop_common::prelude::*;

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Fetch,
    Get(PropertyId),
    Set(PropertyId),
    Subscribe(PropertyId, f32),
    Unsubscribe(PropertyId),
}

#[derive(Default)]
pub struct MockTransport {
    descriptors: Vec<PropertyDescriptor>,
    callback: Mutex<Option<Arc<dyn TransportCallback>>>,
    calls: Mutex<Vec<Call>>,
    /// Statuses returned by get/set before the call succeeds.
    script: Mutex<VecDeque<StatusCode>>,
    /// Answer TRY_AGAIN forever.
    always_busy: AtomicBool,
    fetch_fails: AtomicBool,
    failing_subscribes: Mutex<HashSet<PropertyId>>,
    values: Mutex<HashMap<PropertyId, PropertyValue>>,
}

impl MockTransport {
    pub fn new(descriptors: Vec<PropertyDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            descriptors,
            ..Default::default()
        })
    }

    pub fn with_failing_subscribe(descriptors: Vec<PropertyDescriptor>, prop_id: PropertyId) -> Arc<Self> {
        let transport = Self::new(descriptors);
        transport.failing_subscribes.lock().insert(prop_id);
        transport
    }

    pub fn script(&self, statuses: &[StatusCode]) {
        self.script.lock().extend(statuses.iter().copied());
    }

    pub fn set_always_busy(&self, busy: bool) {
        self.always_busy.store(busy, Ordering::SeqCst);
    }

    pub fn set_fetch_fails(&self, fails: bool) {
        self.fetch_fails.store(fails, Ordering::SeqCst);
    }

    pub fn store(&self, value: PropertyValue) {
        self.values.lock().insert(value.prop_id, value);
    }

    /// Deliver one value-changed callback, as the vehicle would.
    pub fn emit(&self, values: Vec<PropertyValue>) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback.on_values_changed(values);
        }
    }

    pub fn emit_set_error(&self, status: StatusCode, prop_id: PropertyId, area_id: AreaId) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback.on_value_set_error(status, prop_id, area_id);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn get_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Get(_))).count()
    }

    pub fn subscribed(&self) -> Vec<PropertyId> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::Subscribe(id, _) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn unsubscribed(&self) -> Vec<PropertyId> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::Unsubscribe(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn next_status(&self) -> StatusCode {
        if self.always_busy.load(Ordering::SeqCst) {
            return StatusCode::TryAgain;
        }
        self.script.lock().pop_front().unwrap_or(StatusCode::Ok)
    }
}

impl VehicleTransport for MockTransport {
    fn set_callback(&self, callback: Arc<dyn TransportCallback>) {
        *self.callback.lock() = Some(callback);
    }

    fn fetch_all_descriptors(&self) -> Result<Vec<PropertyDescriptor>, StatusCode> {
        self.calls.lock().push(Call::Fetch);
        if self.fetch_fails.load(Ordering::SeqCst) {
            return Err(StatusCode::NotAvailable);
        }
        Ok(self.descriptors.clone())
    }

    fn get(&self, request: &PropertyValue) -> Result<PropertyValue, StatusCode> {
        self.calls.lock().push(Call::Get(request.prop_id));
        match self.next_status() {
            StatusCode::Ok => Ok(self
                .values
                .lock()
                .get(&request.prop_id)
                .cloned()
                .unwrap_or_else(|| request.clone())),
            status => Err(status),
        }
    }

    fn set(&self, value: &PropertyValue) -> StatusCode {
        self.calls.lock().push(Call::Set(value.prop_id));
        let status = self.next_status();
        if status == StatusCode::Ok {
            self.store(value.clone());
        }
        status
    }

    fn subscribe(&self, options: &[SubscribeOptions]) -> StatusCode {
        let mut calls = self.calls.lock();
        for option in options {
            calls.push(Call::Subscribe(option.prop_id, option.sample_rate_hz));
        }
        let failing = self.failing_subscribes.lock();
        if options.iter().any(|o| failing.contains(&o.prop_id)) {
            StatusCode::InternalError
        } else {
            StatusCode::Ok
        }
    }

    fn unsubscribe(&self, prop_id: PropertyId) -> StatusCode {
        self.calls.lock().push(Call::Unsubscribe(prop_id));
        StatusCode::Ok
    }
}

/// What a `TestHandler` saw, shared with the test body.
#[derive(Default)]
pub struct HandlerLog {
    pub offered: Mutex<Vec<PropertyId>>,
    pub batches: Mutex<Vec<Vec<PropertyId>>>,
    pub set_errors: Mutex<Vec<(PropertyId, AreaId)>>,
    pub inits: AtomicUsize,
    pub releases: AtomicUsize,
    pub ctx: Mutex<Option<Arc<dyn HubContext>>>,
}

impl HandlerLog {
    pub fn ctx(&self) -> Arc<dyn HubContext> {
        self.ctx.lock().clone().expect("handler was not initialized")
    }

    pub fn batches(&self) -> Vec<Vec<PropertyId>> {
        self.batches.lock().clone()
    }

    pub fn received(&self) -> Vec<PropertyId> {
        self.batches().into_iter().flatten().collect()
    }
}

/// Cross-handler record of callbacks in the order they ran.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub struct TestHandler {
    name: &'static str,
    wants: Vec<PropertyId>,
    /// Extra ids returned from `claim_properties` even if not offered.
    greedy: Vec<PropertyId>,
    log: Arc<HandlerLog>,
    journal: Journal,
    panic_next_batch: Arc<AtomicBool>,
    panic_on_claim: bool,
    /// Runs at the end of `on_init`.
    init_hook: Option<Box<dyn FnMut() + Send>>,
}

impl TestHandler {
    pub fn new(name: &'static str, wants: &[PropertyId], journal: &Journal) -> (Self, Arc<HandlerLog>) {
        let log = Arc::new(HandlerLog::default());
        let handler = Self {
            name,
            wants: wants.to_vec(),
            greedy: Vec::new(),
            log: log.clone(),
            journal: journal.clone(),
            panic_next_batch: Arc::new(AtomicBool::new(false)),
            panic_on_claim: false,
            init_hook: None,
        };
        (handler, log)
    }

    pub fn greedy(mut self, ids: &[PropertyId]) -> Self {
        self.greedy = ids.to_vec();
        self
    }

    /// Panic inside `claim_properties`.
    pub fn panicking_claim(mut self) -> Self {
        self.panic_on_claim = true;
        self
    }

    /// Run `hook` once this handler's `on_init` is done.
    pub fn after_init(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.init_hook = Some(Box::new(hook));
        self
    }

    /// Flag that makes the next `on_event_batch` panic once.
    pub fn panic_switch(&self) -> Arc<AtomicBool> {
        self.panic_next_batch.clone()
    }

    pub fn boxed(self) -> Box<dyn PropertyHandler> {
        Box::new(self)
    }
}

impl PropertyHandler for TestHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn claim_properties(
        &mut self,
        offered: &[Arc<PropertyDescriptor>],
    ) -> Vec<Arc<PropertyDescriptor>> {
        *self.log.offered.lock() = offered.iter().map(|d| d.id).collect();
        if self.panic_on_claim {
            panic!("handler {} cannot claim", self.name);
        }
        let mut claimed: Vec<_> = offered
            .iter()
            .filter(|d| self.wants.contains(&d.id))
            .cloned()
            .collect();
        for id in &self.greedy {
            claimed.push(Arc::new(PropertyDescriptor::new(
                *id,
                PropertyAccess::Read,
                ChangeMode::OnChange,
                ValueShape::Int32,
            )));
        }
        claimed
    }

    fn on_init(&mut self, ctx: Arc<dyn HubContext>) {
        self.log.inits.fetch_add(1, Ordering::SeqCst);
        *self.log.ctx.lock() = Some(ctx);
        self.journal.lock().push(format!("init:{}", self.name));
        if let Some(hook) = self.init_hook.as_mut() {
            hook();
        }
    }

    fn on_release(&mut self) {
        self.log.releases.fetch_add(1, Ordering::SeqCst);
        self.log.ctx.lock().take();
        self.journal.lock().push(format!("release:{}", self.name));
    }

    fn on_event_batch(&mut self, values: Vec<PropertyValue>) {
        if self.panic_next_batch.swap(false, Ordering::SeqCst) {
            panic!("handler {} exploded", self.name);
        }
        self.journal.lock().push(format!("batch:{}", self.name));
        self.log
            .batches
            .lock()
            .push(values.iter().map(|v| v.prop_id).collect());
    }

    fn on_set_error(&mut self, prop_id: PropertyId, area_id: AreaId) {
        self.log.set_errors.lock().push((prop_id, area_id));
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "  wants {:?}", self.wants)
    }
}

pub fn journal() -> Journal {
    Arc::default()
}

pub fn on_change(id: PropertyId) -> PropertyDescriptor {
    PropertyDescriptor::new(id, PropertyAccess::ReadWrite, ChangeMode::OnChange, ValueShape::Int32)
}

pub fn read_only(id: PropertyId) -> PropertyDescriptor {
    PropertyDescriptor::new(id, PropertyAccess::Read, ChangeMode::OnChange, ValueShape::Int32)
}

pub fn static_prop(id: PropertyId) -> PropertyDescriptor {
    PropertyDescriptor::new(id, PropertyAccess::Read, ChangeMode::Static, ValueShape::Int32)
}

pub fn continuous(id: PropertyId, min: f32, max: f32) -> PropertyDescriptor {
    PropertyDescriptor::new(id, PropertyAccess::Read, ChangeMode::Continuous, ValueShape::Float)
        .with_sample_rates(min, max)
}

pub fn value(id: PropertyId, v: i32) -> PropertyValue {
    PropertyValue::new(id, GLOBAL_AREA, 0, Value::Int32(v))
}

/// Fast retry budget for tests.
pub fn quick_retry() -> vprop_hub::RetryPolicy {
    vprop_hub::RetryPolicy {
        timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(20),
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub const WAIT: Duration = Duration::from_secs(2);
