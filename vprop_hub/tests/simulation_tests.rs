//! End-to-end tests: built-in handlers over the simulated transport, driven by
//! the shipped config directory.

mod common;

use common::{WAIT, wait_until};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vprop_common::prelude::*;
use vprop_common::vhal::config::load_config_dir;
use vprop_common::vhal::props::*;
use vprop_hub::commands::{self, CommandOutcome};
use vprop_hub::handlers::cabin::{CabinControl, CabinHandler};
use vprop_hub::handlers::hvac::{
    ClimateSetting, HvacControl, HvacEvent, HvacHandler, HvacProperty,
};
use vprop_hub::handlers::sensor::{SensorControl, SensorHandler, SensorType, SensorValue};
use vprop_hub::{HandlerRegistry, HubState, RetryPolicy, SimulatedTransport, VehicleHub};

const VENDOR_AMBIENT_LIGHT: PropertyId = 0x2140_0101;
const DRIVER: AreaId = 0x1;

fn config_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config")
}

struct Fixture {
    hub: VehicleHub,
    sim: Arc<SimulatedTransport>,
    sensor: SensorControl,
    hvac: HvacControl,
    hvac_events: Arc<Mutex<Vec<HvacEvent>>>,
    cabin: CabinControl,
}

fn fixture() -> Fixture {
    let config = load_config_dir(&config_dir()).unwrap();
    let registry = HandlerRegistry::with_builtin_handlers();

    let hvac_events = Arc::new(Mutex::new(Vec::new()));
    let sink = hvac_events.clone();
    let sensor = SensorHandler::new();
    let hvac = HvacHandler::new().with_listener(move |e| sink.lock().push(*e));
    let cabin = CabinHandler::new();
    let (sensor_ctl, hvac_ctl, cabin_ctl) = (sensor.control(), hvac.control(), cabin.control());

    let mut prebuilt: Vec<Box<dyn PropertyHandler>> =
        vec![Box::new(sensor), Box::new(hvac), Box::new(cabin)];
    let handlers = config
        .hub
        .handlers
        .iter()
        .map(|name| match prebuilt.iter().position(|h| h.name() == name.as_str()) {
            Some(idx) => prebuilt.remove(idx),
            None => registry.create_handler(name).unwrap(),
        })
        .collect();

    let sim = Arc::new(SimulatedTransport::new(
        &config.properties,
        &config.hub.simulation,
    ));
    let hub = VehicleHub::new(sim.clone(), handlers, RetryPolicy::from(&config.hub.retry)).unwrap();
    hub.init().unwrap();

    Fixture {
        hub,
        sim,
        sensor: sensor_ctl,
        hvac: hvac_ctl,
        hvac_events,
        cabin: cabin_ctl,
    }
}

#[test]
fn shipped_config_initializes() {
    let f = fixture();
    assert_eq!(f.hub.state(), HubState::Running);
    assert_eq!(f.hub.handler_names().len(), 9);
    assert_eq!(
        f.hub.registry().len(),
        f.sim.fetch_all_descriptors().unwrap().len()
    );
}

#[test]
fn builtin_handlers_claim_disjoint_sets() {
    let f = fixture();
    let mut seen = std::collections::HashSet::new();
    for name in f.hub.handler_names() {
        for id in f.hub.claims_of(name) {
            assert!(seen.insert(id), "{} claimed twice", PropId(id));
        }
    }

    assert_eq!(f.hub.owner_of(PERF_VEHICLE_SPEED), Some("sensor"));
    assert_eq!(f.hub.owner_of(AP_POWER_STATE_REQ), Some("power"));
    assert_eq!(f.hub.owner_of(HW_KEY_INPUT), Some("input"));
    assert_eq!(f.hub.owner_of(AUDIO_VOLUME), Some("audio"));
    assert_eq!(f.hub.owner_of(HVAC_FAN_SPEED), Some("hvac"));
    assert_eq!(f.hub.owner_of(WINDOW_POS), Some("cabin"));
    assert_eq!(f.hub.owner_of(RADIO_PRESET), Some("radio"));
    assert_eq!(f.hub.owner_of(OBD2_LIVE_FRAME), Some("diagnostic"));
    assert_eq!(f.hub.owner_of(VENDOR_AMBIENT_LIGHT), Some("vendor"));
    assert_eq!(f.hub.owner_of(INFO_VIN), None);
}

#[test]
fn power_reports_wait_for_vhal_at_init() {
    let f = fixture();
    let report = f.sim.peek(AP_POWER_STATE_REPORT, GLOBAL_AREA).unwrap();
    assert_eq!(report.value, Value::Int32Vec(vec![1, 0]));
    assert!(wait_until(WAIT, || f.hub.set_ack_count() >= 1));
}

#[test]
fn continuous_sensors_run_at_handler_rate() {
    let f = fixture();
    let speed = f.sim.subscription(PERF_VEHICLE_SPEED).unwrap();
    assert_eq!(speed.sample_rate_hz, 10.0);
    let odometer = f
        .hub
        .subscriptions()
        .into_iter()
        .find(|s| s.prop_id == PERF_ODOMETER)
        .unwrap();
    assert_eq!(odometer.sample_rate_hz, 10.0);
    assert!(f.sim.subscription(INFO_VIN).is_none());
}

#[test]
fn ticks_feed_sensor_readings() {
    let f = fixture();
    assert!(f.sensor.latest(SensorType::Speed).is_none());

    assert!(f.sim.tick() >= 3);
    assert!(wait_until(WAIT, || f.sensor.latest(SensorType::Rpm).is_some()));
    assert_eq!(
        f.sensor.latest(SensorType::Rpm).unwrap().value,
        SensorValue::Float(780.0)
    );
    assert!(f.hub.event_log_entry(PERF_VEHICLE_SPEED).is_some());
}

#[test]
fn injected_change_reaches_sensor() {
    let f = fixture();
    f.sim
        .inject(vec![PropertyValue::new(GEAR_SELECTION, GLOBAL_AREA, 5, Value::Int32(8))])
        .unwrap();
    assert!(wait_until(WAIT, || {
        f.sensor.latest(SensorType::Gear).map(|r| r.value) == Some(SensorValue::Int(8))
    }));
}

#[test]
fn hvac_temperature_is_bounded_by_area_config() {
    let f = fixture();
    assert!(matches!(
        f.hvac.set_temperature(DRIVER, 40.0),
        Err(VhalError::InvalidArgument(_))
    ));

    f.hvac.set_temperature(DRIVER, 22.5).unwrap();
    assert_eq!(
        f.sim.peek(HVAC_TEMPERATURE_SET, DRIVER).unwrap().value,
        Value::Float(22.5)
    );
    assert!(wait_until(WAIT, || {
        f.hvac.setting(HvacProperty::Temperature, DRIVER) == Some(ClimateSetting::Temperature(22.5))
    }));
}

#[test]
fn rejected_hvac_set_reaches_listener() {
    let f = fixture();
    f.sim.reject_sets(HVAC_AC_ON);
    f.hvac.set_ac(DRIVER, true).unwrap();
    assert!(wait_until(WAIT, || {
        f.hvac_events.lock().contains(&HvacEvent::SetFailed {
            property: HvacProperty::AcOn,
            zone: DRIVER,
        })
    }));
}

#[test]
fn cabin_door_lock_round_trip() {
    let f = fixture();
    assert!(!f.cabin.is_door_locked(DRIVER).unwrap());
    f.cabin.lock_door(DRIVER, true).unwrap();
    assert!(f.cabin.is_door_locked(DRIVER).unwrap());
}

#[test]
fn commands_run_through_the_hub() {
    let f = fixture();

    let CommandOutcome::Read(vin) = commands::run(&f.hub, "read-vin").unwrap() else {
        panic!("read-vin must read");
    };
    assert_eq!(vin.value, Value::String("1HGCM82633A004352".into()));

    commands::run(&f.hub, "fold-mirrors").unwrap();
    assert_eq!(
        f.sim.peek(MIRROR_FOLD, GLOBAL_AREA).unwrap().value,
        Value::Bool(true)
    );
    assert!(wait_until(WAIT, || f.hub.event_log_entry(MIRROR_FOLD).is_some()));

    commands::run(&f.hub, "toggle-night-mode").unwrap();
    assert_eq!(
        f.sim.peek(NIGHT_MODE, GLOBAL_AREA).unwrap().value,
        Value::Bool(true)
    );
}

#[test]
fn reconnect_restores_subscriptions() {
    let f = fixture();
    let before: Vec<PropertyId> = f.hub.subscriptions().iter().map(|s| s.prop_id).collect();

    f.sim.disconnect();
    assert!(f.sim.subscribed_ids().is_empty());
    f.sim.reconnect();
    f.hub.on_transport_reconnected(f.sim.clone()).unwrap();

    assert_eq!(f.sim.subscribed_ids(), before);
    f.sim
        .inject(vec![PropertyValue::new(GEAR_SELECTION, GLOBAL_AREA, 9, Value::Int32(2))])
        .unwrap();
    assert!(wait_until(WAIT, || {
        f.sensor.latest(SensorType::Gear).map(|r| r.value) == Some(SensorValue::Int(2))
    }));
}

#[test]
fn release_unsubscribes_everything() {
    let f = fixture();
    assert!(!f.sim.subscribed_ids().is_empty());
    f.hub.release();
    assert!(f.sim.subscribed_ids().is_empty());
    assert!(f.hub.dump().contains("state=released"));
}

#[test]
fn unknown_handler_name_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::copy(
        config_dir().join("properties.toml"),
        dir.path().join("properties.toml"),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("hub.toml"),
        r#"
handlers = ["power", "navigation"]

[shared]
service_name = "vprop-test"
"#,
    )
    .unwrap();

    let config = load_config_dir(dir.path()).unwrap();
    let result = HandlerRegistry::with_builtin_handlers().create_handlers(&config.hub.handlers);
    assert!(matches!(result, Err(VhalError::ConfigError(_))));
}
