//! ControlLoop end to end: sampler, control and link threads running
//! against the recording bus, line and hub.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use levelwatch::app::events::StateChange;
use levelwatch::app::ports::{ClockPort, StateListener};
use levelwatch::app::service::ControlLoop;
use levelwatch::cloud::link::ConnectionState;
use levelwatch::cloud::reconnect::ReconnectPolicy;
use levelwatch::config::{MeasurementDomain, SystemConfig};
use levelwatch::control::band::Band;
use levelwatch::drivers::indicator::Indicator;
use levelwatch::sensors::weight::WeightSensor;

use crate::mock_hw::{MockBus, MockHub, MockLine, wait_for};

const WAIT: Duration = Duration::from_secs(5);

struct FixedClock(u64);

impl ClockPort for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

struct Recorder(Arc<Mutex<Vec<StateChange>>>);

impl StateListener for Recorder {
    fn on_state_changed(&mut self, change: &StateChange) {
        self.0.lock().unwrap().push(change.clone());
    }
}

fn config() -> SystemConfig {
    let mut c = SystemConfig::default();
    c.device_id = "LW-INTEG".into();
    c.sample_interval_ms = 10;
    c.hub.host_name = "hub.example.net".into();
    c.hub.shared_access_key = "c2VjcmV0".into();
    c
}

/// Frame the ADC answers with for `raw`.
fn frame(raw: u16) -> [u8; 3] {
    [0x00, 0xF8 | (raw >> 8) as u8, (raw & 0xFF) as u8]
}

#[test]
fn raw_zero_reading_end_to_end() {
    // raw 0 → 20 + 1980 = 2000; domain puts 2000 exactly at 20 %.
    let mut cfg = config();
    cfg.domain = MeasurementDomain { min: 1800.0, max: 2800.0 };

    let hub = MockHub::new();
    let line = MockLine::default();
    let bus = MockBus::steady(frame(0));
    let bus_log = bus.log.clone();

    let control = ControlLoop::new(cfg, Indicator::new(Some(line.clone())), hub.clone());
    control.start().unwrap();
    let running = control.run(WeightSensor::new(bus), FixedClock(1_700_000_000_000)).unwrap();

    assert!(wait_for(WAIT, || hub.sent_count() >= 2));
    running.shutdown();

    let sent = hub.sent_json();
    assert_eq!(sent[0]["ObjectType"], "DeviceInfo");
    assert_eq!(sent[1], serde_json::json!({"DeviceId": "LW-INTEG", "Weight": 2000.0}));
    assert!(line.levels.lock().unwrap().contains(&true));

    let snap = control.snapshot();
    assert_eq!(snap.current_band, Some(Band::Critical));
    assert!((snap.percent_remaining - 0.2).abs() < 1e-12);

    // every transfer was the channel-0 request
    assert!(bus_log.lock().unwrap().writes.iter().all(|w| w == &[0x01, 0x80, 0x00]));
}

#[test]
fn bus_faults_are_retried_next_tick() {
    let hub = MockHub::new();
    let bus = MockBus::steady(frame(512)).with_script(&[None, None, Some(frame(512))]);

    let control: ControlLoop<MockLine, _> = ControlLoop::new(config(), Indicator::new(None), hub);
    let running = control.run(WeightSensor::new(bus), FixedClock(0)).unwrap();

    assert!(wait_for(WAIT, || control.stats().samples >= 2));
    running.shutdown();

    let stats = control.stats();
    assert_eq!(stats.bus_faults, 2);
    assert!(stats.samples >= 2);
}

#[test]
fn out_of_range_readings_freeze_percent_only() {
    let hub = MockHub::new();
    let line = MockLine::default();
    // raw 1023 → 21, far below the 500 floor
    let bus = MockBus::steady(frame(1023)).with_script(&[Some(frame(512))]);

    let control = ControlLoop::new(config(), Indicator::new(Some(line.clone())), hub.clone());
    control.start().unwrap();
    let running = control.run(WeightSensor::new(bus), FixedClock(0)).unwrap();
    assert!(wait_for(WAIT, || control.stats().discarded >= 3));
    running.shutdown();

    // raw 512 → 1010 → 0.75
    let snap = control.snapshot();
    assert!((snap.percent_remaining - 0.75).abs() < 1e-9);
    assert_eq!(snap.current_band, Some(Band::Critical));
    assert!(line.levels.lock().unwrap().contains(&true));

    let weights: Vec<f64> = hub
        .sent_json()
        .iter()
        .filter_map(|v| v.get("Weight").and_then(serde_json::Value::as_f64))
        .collect();
    assert_eq!(weights[0], 1010.0);
    assert!(weights[1..].iter().all(|w| *w == 21.0));
}

#[test]
fn remote_commands_are_applied_and_settled() {
    let hub = MockHub::new();
    let bus = MockBus::steady(frame(512));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let control: ControlLoop<MockLine, _> = ControlLoop::new(config(), Indicator::new(None), hub.clone());
    control.subscribe(Recorder(seen.clone()));
    control.start().unwrap();
    let running = control.run(WeightSensor::new(bus), FixedClock(0)).unwrap();

    let bad = hub.push(b"{\"Name\":");
    let good = hub.push(br#"{"Name":"LevelCommand","Parameters":{"Level":"Warning"}}"#);
    let other = hub.push(br#"{"Name":"Calibrate","Parameters":{}}"#);
    assert!(wait_for(WAIT, || hub.acked().len() == 2));
    running.shutdown();

    assert_eq!(hub.rejected(), vec![bad]);
    assert_eq!(hub.acked(), vec![good, other]);
    assert_eq!(control.snapshot().last_remote_message.as_deref(), Some("Warning"));
    assert!(
        seen.lock()
            .unwrap()
            .contains(&StateChange::RemoteMessage("Warning".into()))
    );
    let stats = control.stats();
    assert_eq!((stats.acked, stats.rejected), (2, 1));
}

#[test]
fn shutdown_releases_bus_session_and_actuator() {
    let mut cfg = config();
    cfg.domain = MeasurementDomain { min: 1800.0, max: 2800.0 };
    let hub = MockHub::new();
    let line = MockLine::default();
    let bus = MockBus::steady(frame(0));
    let dropped = bus.dropped.clone();

    let control = ControlLoop::new(cfg, Indicator::new(Some(line.clone())), hub.clone());
    control.start().unwrap();
    let running = control.run(WeightSensor::new(bus), FixedClock(0)).unwrap();
    assert!(wait_for(WAIT, || line.is_high()));

    running.shutdown();

    assert!(dropped.load(Ordering::SeqCst), "bus handle released");
    assert!(hub.closes() >= 1, "session closed");
    assert!(!line.is_high(), "actuator forced off");
    assert_eq!(control.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn dropping_the_handle_also_shuts_down() {
    let hub = MockHub::new();
    let bus = MockBus::steady(frame(100));
    let dropped = bus.dropped.clone();

    let control: ControlLoop<MockLine, _> = ControlLoop::new(config(), Indicator::new(None), hub.clone());
    control.start().unwrap();
    {
        let _running = control.run(WeightSensor::new(bus), FixedClock(0)).unwrap();
        assert!(wait_for(WAIT, || control.stats().samples >= 1));
    }
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(hub.closes(), 1);
}

#[test]
fn connect_once_policy_stays_down() {
    let hub = MockHub::new();
    hub.fail_connects(1);
    let bus = MockBus::steady(frame(512));

    let control: ControlLoop<MockLine, _> = ControlLoop::new(config(), Indicator::new(None), hub.clone());
    assert!(control.start().is_err());
    let running = control.run(WeightSensor::new(bus), FixedClock(0)).unwrap();
    assert!(wait_for(WAIT, || control.stats().samples >= 3));
    running.shutdown();

    assert_eq!(hub.connect_count(), 1);
    assert_eq!(hub.sent_count(), 0);
    assert_eq!(control.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn backoff_policy_reconnects_and_reannounces() {
    let mut cfg = config();
    cfg.hub.reconnect = ReconnectPolicy::Backoff {
        initial_ms: 5,
        max_ms: 20,
        max_attempts: 0,
    };
    let hub = MockHub::new();
    hub.fail_connects(2);
    let bus = MockBus::steady(frame(512));

    let control: ControlLoop<MockLine, _> = ControlLoop::new(cfg, Indicator::new(None), hub.clone());
    assert!(control.start().is_err());
    let running = control.run(WeightSensor::new(bus), FixedClock(0)).unwrap();
    assert!(wait_for(WAIT, || control.connection_state() == ConnectionState::Connected));
    assert!(wait_for(WAIT, || hub.sent_count() >= 2));

    // drop the session; the link thread connects again
    hub.push_failure(levelwatch::cloud::hub::HubError::Transport);
    assert!(wait_for(WAIT, || descriptors(&hub) == 2));
    assert!(hub.connect_count() >= 4);
    assert_eq!(control.connection_state(), ConnectionState::Connected);
    running.shutdown();
}

#[test]
fn shutdown_during_reconnect_leaves_no_session_open() {
    let mut cfg = config();
    cfg.hub.reconnect = ReconnectPolicy::Backoff {
        initial_ms: 0,
        max_ms: 0,
        max_attempts: 0,
    };

    for i in 0..200u64 {
        let hub = MockHub::new();
        hub.fail_receives();
        let control: ControlLoop<MockLine, _> =
            ControlLoop::new(cfg.clone(), Indicator::new(None), hub.clone());
        let running = control.run(WeightSensor::new(MockBus::steady(frame(512))), FixedClock(0)).unwrap();
        std::thread::sleep(Duration::from_micros(100 * (i % 7)));
        running.shutdown();

        assert_eq!(hub.open_sessions(), 0, "iteration {i}");
        assert_ne!(control.connection_state(), ConnectionState::Connected, "iteration {i}");
    }
}

fn descriptors(hub: &MockHub) -> usize {
    hub.sent_json()
        .iter()
        .filter(|v| v["ObjectType"] == "DeviceInfo")
        .count()
}
