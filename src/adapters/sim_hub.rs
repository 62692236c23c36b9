//! In-process hub for host runs and tests.
//!
//! Implements [`HubClient`] without any network.  Outbound payloads are
//! logged and recorded; inbound deliveries are injected by the caller
//! and handed to the session through an embassy channel, so `receive`
//! blocks exactly like a real SDK call until something arrives or the
//! session is closed.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future;
use log::{debug, info};

use crate::cloud::hub::{
    ConnectionDescriptor, HubClient, HubError, HubSession, InboundMessage, MessageHandle,
};

/// Inbound queue depth per session.
const INBOUND_DEPTH: usize = 16;

enum Delivery {
    Message(InboundMessage),
    /// An empty receive round (`Ok(None)`).
    Nothing,
    /// Transport loss.
    Fail(HubError),
    /// Wake-up after `close`.
    Closed,
}

type Inbound = Channel<CriticalSectionRawMutex, Delivery, INBOUND_DEPTH>;

#[derive(Default)]
struct Record {
    sent: Vec<Vec<u8>>,
    acknowledged: Vec<MessageHandle>,
    rejected: Vec<MessageHandle>,
    last_descriptor: Option<ConnectionDescriptor>,
    connect_failure: Option<HubError>,
    backlog: Vec<Delivery>,
    current: Option<Arc<SessionShared>>,
}

#[derive(Default)]
struct HubShared {
    record: Mutex<Record>,
    connects: AtomicU32,
    next_handle: AtomicU64,
    fail_send: AtomicBool,
}

impl HubShared {
    fn lock(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct SessionShared {
    inbound: Inbound,
    closed: AtomicBool,
}

/// Cloneable handle; every clone drives the same simulated hub.
#[derive(Clone, Default)]
pub struct SimulatedHub {
    shared: Arc<HubShared>,
}

impl SimulatedHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent connects fail with `err` (`None` to succeed again).
    pub fn set_connect_failure(&self, err: Option<HubError>) {
        self.shared.lock().connect_failure = err;
    }

    /// Make subsequent sends fail.
    pub fn set_send_failure(&self, fail: bool) {
        self.shared.fail_send.store(fail, Ordering::Relaxed);
    }

    /// Queue one inbound payload.  Delivered to the live session, or to
    /// the next one if nothing is connected.
    pub fn inject(&self, payload: Vec<u8>) -> MessageHandle {
        let handle = MessageHandle(self.shared.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.deliver(Delivery::Message(InboundMessage { handle, payload }));
        handle
    }

    /// Queue a receive round that yields nothing.
    pub fn inject_empty(&self) {
        self.deliver(Delivery::Nothing);
    }

    /// Queue a transport failure behind any pending deliveries.
    pub fn drop_session(&self, err: HubError) {
        self.deliver(Delivery::Fail(err));
    }

    pub fn connect_count(&self) -> u32 {
        self.shared.connects.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.shared
            .lock()
            .current
            .as_ref()
            .is_some_and(|s| !s.closed.load(Ordering::Acquire))
    }

    pub fn last_descriptor(&self) -> Option<ConnectionDescriptor> {
        self.shared.lock().last_descriptor.clone()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.shared.lock().sent.clone()
    }

    /// Sent payloads parsed as JSON (unparseable ones are skipped).
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .filter_map(|b| serde_json::from_slice(b).ok())
            .collect()
    }

    pub fn acknowledged(&self) -> Vec<MessageHandle> {
        self.shared.lock().acknowledged.clone()
    }

    pub fn rejected(&self) -> Vec<MessageHandle> {
        self.shared.lock().rejected.clone()
    }

    fn deliver(&self, delivery: Delivery) {
        let mut rec = self.shared.lock();
        match rec.current.clone() {
            Some(session) if !session.closed.load(Ordering::Acquire) => {
                if let Err(embassy_sync::channel::TrySendError::Full(d)) =
                    session.inbound.try_send(delivery)
                {
                    rec.backlog.push(d);
                }
            }
            _ => rec.backlog.push(delivery),
        }
    }
}

impl HubClient for SimulatedHub {
    type Session = SimulatedSession;

    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Self::Session, HubError> {
        self.shared.connects.fetch_add(1, Ordering::Relaxed);
        let mut rec = self.shared.lock();
        rec.last_descriptor = Some(descriptor.clone());
        if let Some(err) = rec.connect_failure {
            return Err(err);
        }

        let session = Arc::new(SessionShared {
            inbound: Channel::new(),
            closed: AtomicBool::new(false),
        });
        let backlog = core::mem::take(&mut rec.backlog);
        let mut rest = backlog.into_iter();
        for d in rest.by_ref() {
            if let Err(embassy_sync::channel::TrySendError::Full(d)) = session.inbound.try_send(d) {
                rec.backlog.push(d);
                break;
            }
        }
        rec.backlog.extend(rest);
        rec.current = Some(session.clone());

        info!("sim-hub: session opened for '{}'", descriptor.device_id);
        Ok(SimulatedSession {
            hub: self.shared.clone(),
            session,
        })
    }
}

pub struct SimulatedSession {
    hub: Arc<HubShared>,
    session: Arc<SessionShared>,
}

impl SimulatedSession {
    fn is_closed(&self) -> bool {
        self.session.closed.load(Ordering::Acquire)
    }
}

impl HubSession for SimulatedSession {
    fn send(&self, payload: &[u8]) -> Result<(), HubError> {
        if self.is_closed() {
            return Err(HubError::Closed);
        }
        if self.hub.fail_send.load(Ordering::Relaxed) {
            return Err(HubError::Transport);
        }
        info!("sim-hub: <- {}", String::from_utf8_lossy(payload));
        self.hub.lock().sent.push(payload.to_vec());
        Ok(())
    }

    fn receive(&self) -> Result<Option<InboundMessage>, HubError> {
        if self.is_closed() {
            return Err(HubError::Closed);
        }
        match future::block_on(self.session.inbound.receive()) {
            Delivery::Message(m) => {
                debug!("sim-hub: -> {:?}", m.handle);
                Ok(Some(m))
            }
            Delivery::Nothing => Ok(None),
            Delivery::Fail(e) => Err(e),
            Delivery::Closed => Err(HubError::Closed),
        }
    }

    fn acknowledge(&self, handle: MessageHandle) -> Result<(), HubError> {
        self.hub.lock().acknowledged.push(handle);
        Ok(())
    }

    fn reject(&self, handle: MessageHandle) -> Result<(), HubError> {
        self.hub.lock().rejected.push(handle);
        Ok(())
    }

    fn close(&self) {
        if self.session.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.session.inbound.try_send(Delivery::Closed);
        info!("sim-hub: session closed");
    }
}
