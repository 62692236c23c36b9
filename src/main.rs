//! LevelWatch host binary.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   Adapters (outer ring)                    │
//! │                                                            │
//! │  SimulatedAdc    SimulatedLine   SimulatedHub   SystemClock│
//! │  (SpiDevice)     (OutputPin)     (HubClient)    (ClockPort)│
//! │  FileConfigStore LogStateListener                          │
//! │  (ConfigPort)    (StateListener)                           │
//! │                                                            │
//! │  ──────────────── Port / HAL trait boundary ───────────    │
//! │                                                            │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │ ControlLoop                                      │      │
//! │  │ WeightSensor · MetricConverter · BandClassifier  │      │
//! │  │ Indicator · CloudLink                            │      │
//! │  └──────────────────────────────────────────────────┘      │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Runs until `run_for_secs` elapses or, without it, until an empty line
//! or EOF on stdin.  Any other line is injected into the simulated hub
//! as a `LevelCommand` carrying that level.

use std::io::{self, BufRead};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};

use levelwatch::adapters::config_file::FileConfigStore;
use levelwatch::adapters::device_id;
use levelwatch::adapters::log_sink::LogStateListener;
use levelwatch::adapters::sim_adc::SimulatedAdc;
use levelwatch::adapters::sim_gpio;
use levelwatch::adapters::sim_hub::SimulatedHub;
use levelwatch::adapters::time::SystemClock;
use levelwatch::app::ports::{ConfigError, ConfigPort};
use levelwatch::app::service::ControlLoop;
use levelwatch::cloud::payload::{self, LEVEL_COMMAND_NAME, LEVEL_PARAM_NAME, RemoteCommand};
use levelwatch::config::SystemConfig;
use levelwatch::drivers::indicator::Indicator;
use levelwatch::sensors::weight::WeightSensor;

/// Simulated reservoir: starts just under full and drains one ADC count
/// per sample.
const SIM_START_RAW: u16 = 420;
const SIM_DRAIN_PER_SAMPLE: i32 = 1;

const SIM_HOST_NAME: &str = "levelwatch.sim.local";
const SIM_ACCESS_KEY: &str = "c2ltdWxhdGVk";

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("LevelWatch v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Configuration ──────────────────────────────────────
    let store = FileConfigStore::from_env();
    let mut config = match store.load() {
        Ok(cfg) => cfg,
        Err(ConfigError::NotFound) => {
            info!("No config at {}, using defaults", store.path().display());
            SystemConfig::default()
        }
        Err(e) => {
            warn!("Config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };
    config.device_id = device_id::resolve(&config.device_id);
    if config.hub.host_name.is_empty() || config.hub.shared_access_key.is_empty() {
        info!("Hub credentials not provisioned; using the simulated hub endpoint");
        config.hub.host_name = SIM_HOST_NAME.into();
        config.hub.shared_access_key = SIM_ACCESS_KEY.into();
    }
    config.profile.simulated = true;
    info!("Device ID: {}", config.device_id);

    // ── 3. Hardware ───────────────────────────────────────────
    // No sampling bus is the one fatal startup fault.
    let (adc, probe) = SimulatedAdc::open(&config.bus, SIM_START_RAW)
        .context("sampling bus unavailable")?;
    probe.set_drift(SIM_DRAIN_PER_SAMPLE);
    let sensor = WeightSensor::new(adc);

    let line = sim_gpio::open_line(config.actuator_pin);
    if line.is_none() {
        warn!("No actuator line; running without local alarm");
    }
    let indicator = Indicator::new(line);

    // ── 4. Control loop ───────────────────────────────────────
    let run_for = config.run_for_secs;
    let hub = SimulatedHub::new();
    let control = ControlLoop::new(config, indicator, hub.clone());
    control.subscribe(LogStateListener::new());

    if let Err(e) = control.start() {
        error!("Hub connect failed ({}); continuing without hub", e);
    }

    let clock = SystemClock::new();
    let running = control.run(sensor, SystemClock::new())?;
    info!("System ready.");

    // ── 5. Wait for stop ──────────────────────────────────────
    match run_for {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => {
            info!("Type Good/Warning/Critical to send a remote level; empty line quits");
            for line in io::stdin().lock().lines() {
                let line = line?;
                let level = line.trim();
                if level.is_empty() {
                    break;
                }
                let cmd = RemoteCommand::new(LEVEL_COMMAND_NAME).with_parameter(LEVEL_PARAM_NAME, level);
                hub.inject(payload::encode(&cmd)?);
            }
        }
    }

    // ── 6. Shutdown ───────────────────────────────────────────
    let stats = running.control().stats();
    info!(
        "Ran {} s: {} samples ({} discarded, {} bus faults), {} published, {} acked, {} rejected",
        clock.uptime_secs(),
        stats.samples,
        stats.discarded,
        stats.bus_faults,
        stats.published,
        stats.acked,
        stats.rejected
    );
    running.shutdown();
    Ok(())
}
