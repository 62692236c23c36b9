//! Control loop: the application core.
//!
//! [`ControlLoop`] owns the classifier, the alarm output and the hub
//! link for the life of the process.  Two event sources feed it:
//!
//! ```text
//!  sampler thread ──Measurement──▶ ┌──────────────┐ ──▶ Indicator
//!   (WeightSensor)    channel      │ ControlLoop  │ ──▶ CloudLink.publish
//!  link thread ──RemoteCommand───▶ │ state · band │ ──▶ StateListener(s)
//!   (CloudLink.receive_loop)       └──────────────┘
//! ```
//!
//! Both paths write the observable state and the actuator, so those
//! live behind one mutex.  The bus handle never leaves the sampler
//! thread and the session never leaves the link.
//!
//! Listeners run after the state mutex is released, but each commit
//! takes a delivery ticket while still holding it, so listeners see
//! changes in the order they were committed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;
use futures_lite::future;
use log::{debug, error, info, warn};

use crate::cloud::hub::HubClient;
use crate::cloud::link::{CloudLink, ConnectionState, PublishOutcome, ReceiveExit};
use crate::cloud::payload::{DeviceDescriptor, RemoteCommand, TelemetryRecord};
use crate::config::SystemConfig;
use crate::control::band::{self, Band, BandClassifier};
use crate::drivers::hw_timer;
use crate::drivers::indicator::{Indicator, IndicatorState};
use crate::error::{ActuatorError, Error};
use crate::sensors::Measurement;
use crate::sensors::calibration::MetricConverter;
use crate::sensors::weight::WeightSensor;
use crate::shutdown::Shutdown;

use super::commands::AppCommand;
use super::events::{MonitorState, StateChange};
use super::ports::{ClockPort, StateListener};

/// Depth of the sampler → control queue.
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Messages from the sampler (and shutdown) to the control thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopEvent {
    Sample(Measurement),
    Stop,
}

type EventQueue = Channel<CriticalSectionRawMutex, LoopEvent, EVENT_QUEUE_DEPTH>;

/// Runtime counters, as returned by [`ControlLoop::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Measurements run through the loop.
    pub samples: u64,
    /// Readings whose percentage fell outside [0, 1].
    pub discarded: u64,
    /// Failed bus transactions.
    pub bus_faults: u64,
    /// Samples dropped because the control thread was behind.
    pub queue_overflows: u64,
    /// Messages handed to the hub.
    pub published: u64,
    pub publish_faults: u64,
    /// Inbound commands acknowledged.
    pub acked: u64,
    /// Inbound commands rejected.
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    samples: AtomicU64,
    discarded: AtomicU64,
    bus_faults: AtomicU64,
    queue_overflows: AtomicU64,
}

struct Guarded<P> {
    state: MonitorState,
    indicator: Indicator<P>,
    next_ticket: u64,
}

impl<P> Guarded<P> {
    /// Reserve the delivery slot for changes committed under this lock.
    fn ticket(&mut self, changes: &[StateChange]) -> Option<u64> {
        if changes.is_empty() {
            return None;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        Some(ticket)
    }
}

type Listener = Box<dyn StateListener + Send>;

struct Shared<P, H: HubClient> {
    device_id: String,
    config: SystemConfig,
    converter: MetricConverter,
    classifier: BandClassifier,
    link: CloudLink<H>,
    guarded: Mutex<Guarded<P>>,
    listeners: Mutex<Vec<Listener>>,
    /// Next ticket allowed to notify.
    delivery: Mutex<u64>,
    delivered: Condvar,
    counters: Counters,
    shutdown: Arc<Shutdown>,
}

// ───────────────────────────────────────────────────────────────
// ControlLoop
// ───────────────────────────────────────────────────────────────

/// The monitoring loop.  Cheap to clone; clones share all state.
pub struct ControlLoop<P, H: HubClient> {
    shared: Arc<Shared<P, H>>,
}

impl<P, H: HubClient> Clone for ControlLoop<P, H> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P, H> ControlLoop<P, H>
where
    P: OutputPin + Send + 'static,
    H: HubClient,
{
    /// Construct the loop.  `config.device_id` must already be resolved.
    ///
    /// Does **not** connect; call [`start`](Self::start) next.
    pub fn new(config: SystemConfig, indicator: Indicator<P>, hub: H) -> Self {
        let link = CloudLink::new(hub, &config.hub.host_name, &config.hub.shared_access_key);
        let shared = Shared {
            device_id: config.device_id.clone(),
            converter: MetricConverter::new(config.calibration),
            classifier: BandClassifier::new(config.domain),
            link,
            guarded: Mutex::new(Guarded {
                state: MonitorState::default(),
                indicator,
                next_ticket: 0,
            }),
            listeners: Mutex::new(Vec::new()),
            delivery: Mutex::new(0),
            delivered: Condvar::new(),
            counters: Counters::default(),
            shutdown: Arc::new(Shutdown::new()),
            config,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Register a state observer.  Delivery order is registration order.
    pub fn subscribe<L>(&self, listener: L)
    where
        L: StateListener + Send + 'static,
    {
        lock(&self.shared.listeners).push(Box::new(listener));
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Connect to the hub and announce the device descriptor.
    ///
    /// A connect failure is returned for the caller to report; the loop
    /// itself keeps working without the hub.
    pub fn start(&self) -> Result<(), Error> {
        info!("ControlLoop starting as '{}'", self.shared.device_id);
        self.shared.connect_and_announce()
    }

    /// Spawn the sampler, control and link threads.  The sensor (and so
    /// the bus handle) is owned by the sampler thread from here on.
    pub fn run<S, C>(&self, sensor: WeightSensor<S>, clock: C) -> Result<RunningLoop<P, H>, Error>
    where
        S: SpiDevice + Send + 'static,
        C: ClockPort + Send + 'static,
    {
        let events: Arc<EventQueue> = Arc::new(Channel::new());
        let shutdown = self.shared.shutdown.clone();
        let mut running = RunningLoop {
            control: self.clone(),
            events: events.clone(),
            threads: Vec::with_capacity(3),
        };

        // Control: drain samples until Stop.
        let shared = self.shared.clone();
        let queue = events.clone();
        let control = thread::Builder::new()
            .name("control".into())
            .spawn(move || {
                loop {
                    match future::block_on(queue.receive()) {
                        LoopEvent::Sample(m) => {
                            shared.handle_measurement(m);
                        }
                        LoopEvent::Stop => break,
                    }
                }
                info!("control: stopped");
            })
            .map_err(|_| Error::Init("control thread spawn failed"))?;
        running.threads.push(control);

        // Link: receive, and reconnect per policy.
        let shared = self.shared.clone();
        let link = thread::Builder::new()
            .name("link".into())
            .spawn(move || shared.link_task())
            .map_err(|_| Error::Init("link thread spawn failed"))?;
        running.threads.push(link);

        // Sampler: one bus read per tick.
        let mut sensor = sensor;
        let converter = self.shared.converter;
        let shared = self.shared.clone();
        let period = Duration::from_millis(u64::from(self.shared.config.sample_interval_ms));
        let sampler = hw_timer::spawn_periodic("sampler", period, shutdown, move || {
            match sensor.read_raw() {
                Ok(raw) => {
                    let m = converter.measure(raw, clock.now_ms());
                    debug!("sampler: raw={} derived={:.1}", m.raw, m.derived);
                    if events.try_send(LoopEvent::Sample(m)).is_err() {
                        shared.counters.queue_overflows.fetch_add(1, Ordering::Relaxed);
                        warn!("sampler: event queue full, sample dropped");
                    }
                }
                Err(e) => {
                    shared.counters.bus_faults.fetch_add(1, Ordering::Relaxed);
                    warn!("sampler: {e}; retrying next tick");
                }
            }
        })
        .map_err(|_| Error::Init("sampler thread spawn failed"))?;
        running.threads.push(sampler);

        info!(
            "ControlLoop running (sample every {} ms)",
            self.shared.config.sample_interval_ms
        );
        Ok(running)
    }

    // ── Event handlers ────────────────────────────────────────

    /// Process one measurement: update state, drive the actuator,
    /// publish telemetry.  Returns the band it was classified into.
    pub fn handle_measurement(&self, m: Measurement) -> Band {
        self.shared.handle_measurement(m)
    }

    /// Apply one decoded remote command.  An `Err` means the hub should
    /// be told the message was rejected.
    pub fn handle_command(&self, cmd: RemoteCommand) -> Result<(), Error> {
        self.shared.handle_command(cmd)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn snapshot(&self) -> MonitorState {
        self.shared.guard().state.clone()
    }

    pub fn indicator_state(&self) -> IndicatorState {
        self.shared.guard().indicator.state()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.link.state()
    }

    pub fn device_id(&self) -> &str {
        &self.shared.device_id
    }

    pub fn stats(&self) -> LoopStats {
        let c = &self.shared.counters;
        let link = self.shared.link.stats();
        LoopStats {
            samples: c.samples.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            bus_faults: c.bus_faults.load(Ordering::Relaxed),
            queue_overflows: c.queue_overflows.load(Ordering::Relaxed),
            published: link.published,
            publish_faults: link.publish_faults,
            acked: link.acknowledged,
            rejected: link.rejected,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Shared internals
// ───────────────────────────────────────────────────────────────

impl<P, H> Shared<P, H>
where
    P: OutputPin + Send + 'static,
    H: HubClient,
{
    fn guard(&self) -> MutexGuard<'_, Guarded<P>> {
        lock(&self.guarded)
    }

    fn connect_and_announce(&self) -> Result<(), Error> {
        self.link.connect(&self.device_id)?;
        let descriptor = DeviceDescriptor::new(&self.device_id, &self.config.profile);
        if let Err(e) = self.link.publish_descriptor(&descriptor) {
            warn!("ControlLoop: descriptor not announced: {e}");
        }
        Ok(())
    }

    fn handle_measurement(&self, m: Measurement) -> Band {
        self.counters.samples.fetch_add(1, Ordering::Relaxed);
        let pct = self.classifier.normalize(m.derived);
        let band = self.classifier.classify(pct);
        let plausible = band::is_plausible(pct);

        let mut changes = Vec::new();
        let ticket = {
            let mut g = self.guard();
            if plausible && g.state.percent_remaining != pct {
                g.state.percent_remaining = pct;
                changes.push(StateChange::PercentRemaining(pct));
            }
            if g.state.current_band != Some(band) {
                g.state.current_band = Some(band);
                changes.push(StateChange::Band(band));
            }
            match g.indicator.set_band(band) {
                Ok(()) | Err(ActuatorError::Unavailable) => {}
                Err(e) => warn!("ControlLoop: actuator: {e}"),
            }
            g.ticket(&changes)
        };
        self.notify(ticket, &changes);

        if !plausible {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                "ControlLoop: reading {:.1} out of range (pct={:.3}), percent unchanged",
                m.derived, pct
            );
        }

        let record = TelemetryRecord::new(&self.device_id, m.derived, m.timestamp_ms);
        match self.link.publish_telemetry(&record) {
            Ok(PublishOutcome::Sent) | Ok(PublishOutcome::NotConnected) => {}
            Err(e) => debug!("ControlLoop: telemetry dropped: {e}"),
        }
        band
    }

    fn handle_command(&self, cmd: RemoteCommand) -> Result<(), Error> {
        let command = AppCommand::from_remote(cmd)?;
        let on = command.wants_actuator_on();
        match command {
            AppCommand::SetLevel { level, band } => {
                if band.is_none() {
                    warn!("ControlLoop: unknown level '{level}', treating as non-critical");
                }
                let mut changes = Vec::new();
                let (result, ticket) = {
                    let mut g = self.guard();
                    if g.state.last_remote_message.as_deref() != Some(level.as_str()) {
                        g.state.last_remote_message = Some(level.clone());
                        changes.push(StateChange::RemoteMessage(level.clone()));
                    }
                    (g.indicator.switch(on), g.ticket(&changes))
                };
                self.notify(ticket, &changes);
                info!("ControlLoop: remote level '{level}' (actuator {})", if on { "on" } else { "off" });

                match result {
                    Ok(()) | Err(ActuatorError::Unavailable) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            AppCommand::Unsupported(name) => {
                info!("ControlLoop: ignoring unsupported command '{name}'");
                Ok(())
            }
        }
    }

    /// Deliver `changes` once every earlier ticket has been delivered.
    fn notify(&self, ticket: Option<u64>, changes: &[StateChange]) {
        let Some(ticket) = ticket else {
            return;
        };
        let mut turn = lock(&self.delivery);
        while *turn != ticket {
            turn = self
                .delivered
                .wait(turn)
                .unwrap_or_else(PoisonError::into_inner);
        }
        {
            let mut listeners = lock(&self.listeners);
            for change in changes {
                for l in listeners.iter_mut() {
                    l.on_state_changed(change);
                }
            }
        }
        *turn += 1;
        self.delivered.notify_all();
    }

    /// Body of the link thread.
    fn link_task(&self) {
        let policy = self.config.hub.reconnect;
        let mut attempt: u32 = 0;
        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            if self.link.is_connected() {
                match self.link.receive_loop(&self.shutdown, |cmd| self.handle_command(cmd)) {
                    ReceiveExit::Shutdown => break,
                    ReceiveExit::Dropped(e) => warn!("link: session lost: {e}"),
                    ReceiveExit::NotConnected => {}
                }
                continue;
            }

            let Some(delay) = policy.delay(attempt) else {
                info!("link: not connected and reconnect disabled; link idle");
                break;
            };
            info!("link: reconnecting in {} ms (attempt {})", delay.as_millis(), attempt + 1);
            if self.shutdown.wait_timeout(delay) {
                break;
            }
            attempt = attempt.saturating_add(1);
            match self.connect_and_announce() {
                Ok(()) => attempt = 0,
                Err(e) => warn!("link: reconnect failed: {e}"),
            }
        }
        info!("link: stopped");
    }

    fn force_actuator_off(&self) {
        match self.guard().indicator.switch(false) {
            Ok(()) | Err(ActuatorError::Unavailable) => {}
            Err(e) => error!("ControlLoop: could not release actuator: {e}"),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// RunningLoop
// ───────────────────────────────────────────────────────────────

/// Handle to a running loop.  Dropping it shuts the loop down.
pub struct RunningLoop<P, H>
where
    P: OutputPin + Send + 'static,
    H: HubClient,
{
    control: ControlLoop<P, H>,
    events: Arc<EventQueue>,
    threads: Vec<JoinHandle<()>>,
}

impl<P, H> RunningLoop<P, H>
where
    P: OutputPin + Send + 'static,
    H: HubClient,
{
    pub fn control(&self) -> &ControlLoop<P, H> {
        &self.control
    }

    /// Stop sampling, close the hub session, join every thread and
    /// force the actuator off.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        info!("ControlLoop shutting down");
        let shared = &self.control.shared;
        shared.shutdown.trigger();
        shared.link.close();

        let control_alive = self.threads.first().is_some_and(|t| !t.is_finished());
        if control_alive {
            future::block_on(self.events.send(LoopEvent::Stop));
        }

        for t in self.threads.drain(..) {
            let name = t.thread().name().unwrap_or("?").to_string();
            if t.join().is_err() {
                error!("ControlLoop: '{name}' thread panicked");
            }
        }
        shared.force_actuator_off();
        info!("ControlLoop stopped");
    }
}

impl<P, H> Drop for RunningLoop<P, H>
where
    P: OutputPin + Send + 'static,
    H: HubClient,
{
    fn drop(&mut self) {
        self.stop();
    }
}
