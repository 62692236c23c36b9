//! Hub connection lifecycle, telemetry publication and command reception.
//!
//! ```text
//!  Disconnected ──connect──▶ Connecting ──ok──▶ Connected ──drop──▶ Faulted
//!        ▲                        │                  │                 │
//!        │                        └──────err─────────┼────────────────▶│
//!        └────────────────disconnect─────────────────┴─────────────────┘
//!                                         Faulted ──connect──▶ Connecting
//! ```
//!
//! The link owns the session exclusively.  Publishers and the receive
//! loop borrow it through a short critical section; the hub call itself
//! always runs with the lock released so a blocking `receive` never
//! stalls a publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{ConnectFault, Error, PublishFault};
use crate::shutdown::Shutdown;

use super::hub::{ConnectionDescriptor, HubClient, HubError, HubSession, InboundMessage};
use super::payload::{self, DeviceDescriptor, RemoteCommand, TelemetryRecord};

/// Connection lifecycle state.  Owned by [`CloudLink`]; everyone else
/// only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

/// Result of one publish call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the session for delivery.
    Sent,
    /// Not connected; the record was dropped without any I/O.
    NotConnected,
}

/// Why [`CloudLink::receive_loop`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveExit {
    /// Shutdown was requested.
    Shutdown,
    /// The session failed; the link is now `Faulted`.
    Dropped(Error),
    /// Called without a live session.
    NotConnected,
}

/// How one inbound message was settled with the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acknowledged,
    Rejected,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub published: u64,
    pub publish_faults: u64,
    pub acknowledged: u64,
    pub rejected: u64,
}

struct LinkInner<S> {
    state: ConnectionState,
    session: Option<Arc<S>>,
    /// Latched by [`CloudLink::close`]; refuses every later connect.
    closed: bool,
}

#[derive(Default)]
struct LinkCounters {
    published: AtomicU64,
    publish_faults: AtomicU64,
    acknowledged: AtomicU64,
    rejected: AtomicU64,
}

pub struct CloudLink<H: HubClient> {
    hub: H,
    host_name: String,
    shared_access_key: String,
    inner: Mutex<LinkInner<H::Session>>,
    counters: LinkCounters,
}

impl<H: HubClient> CloudLink<H> {
    /// Build a disconnected link with pre-provisioned credentials.
    pub fn new(hub: H, host_name: &str, shared_access_key: &str) -> Self {
        Self {
            hub,
            host_name: host_name.to_string(),
            shared_access_key: shared_access_key.to_string(),
            inner: Mutex::new(LinkInner {
                state: ConnectionState::Disconnected,
                session: None,
                closed: false,
            }),
            counters: LinkCounters::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            published: self.counters.published.load(Ordering::Relaxed),
            publish_faults: self.counters.publish_faults.load(Ordering::Relaxed),
            acknowledged: self.counters.acknowledged.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Open a session as `device_id`.
    ///
    /// Single attempt, no retry.  A failure leaves the link `Faulted`
    /// with no session.  Connecting while already connected is a no-op.
    /// Once [`close`](Self::close) has run every attempt is `Cancelled`.
    pub fn connect(&self, device_id: &str) -> Result<(), Error> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(ConnectFault::Cancelled.into());
            }
            match inner.state {
                ConnectionState::Connecting => {
                    return Err(ConnectFault::AttemptInFlight.into());
                }
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected | ConnectionState::Faulted => {}
            }
            if self.host_name.is_empty() || self.shared_access_key.is_empty() {
                inner.state = ConnectionState::Faulted;
                inner.session = None;
                warn!("cloud: hub credentials not provisioned");
                return Err(ConnectFault::MissingCredentials.into());
            }
            inner.state = ConnectionState::Connecting;
            inner.session = None;
        }

        let descriptor = ConnectionDescriptor {
            host_name: self.host_name.clone(),
            device_id: device_id.to_string(),
            shared_access_key: self.shared_access_key.clone(),
        };
        info!("cloud: connecting to {} as '{}'", self.host_name, device_id);
        let result = self.hub.connect(&descriptor);

        let mut inner = self.lock();
        match result {
            Ok(session) if inner.state == ConnectionState::Connecting => {
                inner.session = Some(Arc::new(session));
                inner.state = ConnectionState::Connected;
                info!("cloud: connected");
                Ok(())
            }
            Ok(session) => {
                // disconnect() ran while the handshake was in flight
                drop(inner);
                session.close();
                info!("cloud: connect cancelled");
                Err(ConnectFault::Cancelled.into())
            }
            Err(e) => {
                if inner.state == ConnectionState::Connecting {
                    inner.state = ConnectionState::Faulted;
                }
                inner.session = None;
                warn!("cloud: connect failed: {e}");
                Err(connect_fault(e).into())
            }
        }
    }

    /// Close the session (if any) and return to `Disconnected`.  Any
    /// blocked `receive` is released.
    pub fn disconnect(&self) {
        let session = {
            let mut inner = self.lock();
            inner.state = ConnectionState::Disconnected;
            inner.session.take()
        };
        if let Some(session) = session {
            session.close();
            info!("cloud: disconnected");
        }
    }

    /// Disconnect for good.  A connect still in its handshake is
    /// cancelled and later attempts are refused.
    pub fn close(&self) {
        self.lock().closed = true;
        self.disconnect();
    }

    /// Move a live link to `Faulted` and release its session.
    pub fn mark_faulted(&self) {
        let session = {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Connected {
                return;
            }
            inner.state = ConnectionState::Faulted;
            inner.session.take()
        };
        if let Some(session) = session {
            session.close();
        }
        warn!("cloud: link faulted");
    }

    // ── Outbound ──────────────────────────────────────────────

    pub fn publish_descriptor(&self, descriptor: &DeviceDescriptor) -> Result<PublishOutcome, Error> {
        self.publish("descriptor", descriptor)
    }

    pub fn publish_telemetry(&self, record: &TelemetryRecord) -> Result<PublishOutcome, Error> {
        self.publish("telemetry", record)
    }

    fn publish<T: Serialize>(&self, kind: &str, record: &T) -> Result<PublishOutcome, Error> {
        let Some(session) = self.session() else {
            debug!("cloud: not connected, {kind} dropped");
            return Ok(PublishOutcome::NotConnected);
        };
        let bytes = payload::encode(record).map_err(|e| {
            self.counters.publish_faults.fetch_add(1, Ordering::Relaxed);
            warn!("cloud: {kind} encode failed: {e}");
            Error::from(PublishFault::Encode)
        })?;
        match session.send(&bytes) {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                debug!("cloud: {kind} sent ({} bytes)", bytes.len());
                Ok(PublishOutcome::Sent)
            }
            Err(e) => {
                self.counters.publish_faults.fetch_add(1, Ordering::Relaxed);
                warn!("cloud: {kind} send failed: {e}; record dropped");
                Err(PublishFault::SendFailed.into())
            }
        }
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Receive and dispatch commands until shutdown or session loss.
    ///
    /// Every delivery is settled exactly once: acknowledged when the
    /// handler succeeds, rejected when decoding or handling fails.
    pub fn receive_loop<F>(&self, shutdown: &Shutdown, mut handler: F) -> ReceiveExit
    where
        F: FnMut(RemoteCommand) -> Result<(), Error>,
    {
        let Some(session) = self.session() else {
            return ReceiveExit::NotConnected;
        };
        info!("cloud: receive loop started");

        loop {
            if shutdown.is_triggered() {
                return ReceiveExit::Shutdown;
            }
            match session.receive() {
                Ok(None) => continue,
                Ok(Some(message)) => {
                    self.settle(session.as_ref(), message, &mut handler);
                }
                Err(e) => {
                    if shutdown.is_triggered() {
                        return ReceiveExit::Shutdown;
                    }
                    warn!("cloud: receive failed: {e}");
                    self.mark_faulted();
                    return ReceiveExit::Dropped(connect_fault(e).into());
                }
            }
        }
    }

    /// Decode, dispatch and settle one inbound message.
    pub fn settle<F>(&self, session: &H::Session, message: InboundMessage, handler: &mut F) -> Settlement
    where
        F: FnMut(RemoteCommand) -> Result<(), Error>,
    {
        let outcome = RemoteCommand::decode(&message.payload)
            .map_err(Error::from)
            .and_then(|command| {
                debug!("cloud: command '{}' received", command.name);
                handler(command)
            });

        match outcome {
            Ok(()) => {
                if let Err(e) = session.acknowledge(message.handle) {
                    warn!("cloud: acknowledge {:?} failed: {e}", message.handle);
                }
                self.counters.acknowledged.fetch_add(1, Ordering::Relaxed);
                Settlement::Acknowledged
            }
            Err(e) => {
                warn!("cloud: rejecting {:?}: {e}", message.handle);
                if let Err(e) = session.reject(message.handle) {
                    warn!("cloud: reject {:?} failed: {e}", message.handle);
                }
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Settlement::Rejected
            }
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn session(&self) -> Option<Arc<H::Session>> {
        let inner = self.lock();
        match inner.state {
            ConnectionState::Connected => inner.session.clone(),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkInner<H::Session>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn connect_fault(e: HubError) -> ConnectFault {
    match e {
        HubError::Unauthorized => ConnectFault::Unauthorized,
        HubError::Unreachable | HubError::Closed | HubError::Busy | HubError::Transport => {
            ConnectFault::Unreachable
        }
    }
}
