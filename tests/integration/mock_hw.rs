//! Recording mocks for integration tests.
//!
//! Every bus transfer, line write and hub call is recorded so tests can
//! assert on the full history without real hardware or network.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, ErrorKind, Operation, SpiDevice};
use levelwatch::cloud::hub::{
    ConnectionDescriptor, HubClient, HubError, HubSession, InboundMessage, MessageHandle,
};

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ── SPI bus ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusError;

impl spi::Error for BusError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Default)]
pub struct BusLog {
    pub writes: Vec<Vec<u8>>,
    /// Responses served in order; `None` fails the transfer.
    pub script: VecDeque<Option<[u8; 3]>>,
    /// Served once the script is exhausted.
    pub steady: [u8; 3],
}

/// SPI device that replays scripted response frames.
pub struct MockBus {
    pub log: Arc<Mutex<BusLog>>,
    pub dropped: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl MockBus {
    pub fn steady(frame: [u8; 3]) -> Self {
        let log = BusLog {
            steady: frame,
            ..BusLog::default()
        };
        Self {
            log: Arc::new(Mutex::new(log)),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_script(mut self, script: &[Option<[u8; 3]>]) -> Self {
        self.log.lock().unwrap().script = script.iter().copied().collect();
        self
    }
}

impl Drop for MockBus {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl spi::ErrorType for MockBus {
    type Error = BusError;
}

impl SpiDevice for MockBus {
    fn transaction(&mut self, ops: &mut [Operation<'_, u8>]) -> Result<(), BusError> {
        let mut log = self.log.lock().unwrap();
        for op in ops {
            if let Operation::Transfer(read, write) = op {
                log.writes.push(write.to_vec());
                let frame = match log.script.pop_front() {
                    Some(Some(f)) => f,
                    Some(None) => return Err(BusError),
                    None => log.steady,
                };
                read.copy_from_slice(&frame);
            }
        }
        Ok(())
    }
}

// ── Output line ───────────────────────────────────────────────

/// Output pin recording every level written (`true` = high).
#[derive(Clone, Default)]
pub struct MockLine {
    pub levels: Arc<Mutex<Vec<bool>>>,
}

#[allow(dead_code)]
impl MockLine {
    pub fn is_high(&self) -> bool {
        self.levels.lock().unwrap().last().copied().unwrap_or(false)
    }

    pub fn writes(&self) -> usize {
        self.levels.lock().unwrap().len()
    }
}

impl digital::ErrorType for MockLine {
    type Error = Infallible;
}

impl OutputPin for MockLine {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.levels.lock().unwrap().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.levels.lock().unwrap().push(true);
        Ok(())
    }
}

// ── Hub ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct HubLog {
    pub connects: Vec<ConnectionDescriptor>,
    pub sent: Vec<Vec<u8>>,
    pub acked: Vec<MessageHandle>,
    pub rejected: Vec<MessageHandle>,
    pub closes: u32,
    /// Sessions handed out by successful connects.
    pub opened: u32,
    pub inbound: VecDeque<Result<Option<InboundMessage>, HubError>>,
    pub fail_connects: u32,
    pub hold_connect: bool,
    /// Every `receive` fails with `Transport`.
    pub fail_receives: bool,
    pub closed: bool,
    pub next_handle: u64,
}

#[derive(Default)]
pub struct HubInner {
    pub log: Mutex<HubLog>,
    pub cv: Condvar,
}

/// Hub recording every call; inbound deliveries are queued by the test.
#[derive(Clone, Default)]
pub struct MockHub {
    pub inner: Arc<HubInner>,
}

#[allow(dead_code)]
impl MockHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connect attempts with `Unreachable`.
    pub fn fail_connects(&self, n: u32) {
        self.inner.log.lock().unwrap().fail_connects = n;
    }

    /// Block connect attempts until [`release_connect`](Self::release_connect).
    pub fn hold_connect(&self) {
        self.inner.log.lock().unwrap().hold_connect = true;
    }

    /// Make every session drop on its first `receive`.
    pub fn fail_receives(&self) {
        self.inner.log.lock().unwrap().fail_receives = true;
    }

    pub fn release_connect(&self) {
        self.inner.log.lock().unwrap().hold_connect = false;
        self.inner.cv.notify_all();
    }

    pub fn push(&self, payload: &[u8]) -> MessageHandle {
        let mut log = self.inner.log.lock().unwrap();
        log.next_handle += 1;
        let handle = MessageHandle(log.next_handle);
        log.inbound.push_back(Ok(Some(InboundMessage {
            handle,
            payload: payload.to_vec(),
        })));
        self.inner.cv.notify_all();
        handle
    }

    pub fn push_failure(&self, err: HubError) {
        self.inner.log.lock().unwrap().inbound.push_back(Err(err));
        self.inner.cv.notify_all();
    }

    pub fn connect_count(&self) -> usize {
        self.inner.log.lock().unwrap().connects.len()
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.inner
            .log
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|b| serde_json::from_slice(b).unwrap())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.log.lock().unwrap().sent.len()
    }

    pub fn acked(&self) -> Vec<MessageHandle> {
        self.inner.log.lock().unwrap().acked.clone()
    }

    pub fn rejected(&self) -> Vec<MessageHandle> {
        self.inner.log.lock().unwrap().rejected.clone()
    }

    pub fn closes(&self) -> u32 {
        self.inner.log.lock().unwrap().closes
    }

    /// Sessions opened and never closed.
    pub fn open_sessions(&self) -> u32 {
        let log = self.inner.log.lock().unwrap();
        log.opened - log.closes
    }
}

impl HubClient for MockHub {
    type Session = MockSession;

    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<MockSession, HubError> {
        let mut log = self.inner.log.lock().unwrap();
        while log.hold_connect {
            log = self.inner.cv.wait(log).unwrap();
        }
        log.connects.push(descriptor.clone());
        if log.fail_connects > 0 {
            log.fail_connects -= 1;
            return Err(HubError::Unreachable);
        }
        log.closed = false;
        log.opened += 1;
        Ok(MockSession {
            inner: self.inner.clone(),
        })
    }
}

pub struct MockSession {
    inner: Arc<HubInner>,
}

impl HubSession for MockSession {
    fn send(&self, payload: &[u8]) -> Result<(), HubError> {
        let mut log = self.inner.log.lock().unwrap();
        if log.closed {
            return Err(HubError::Closed);
        }
        log.sent.push(payload.to_vec());
        Ok(())
    }

    fn receive(&self) -> Result<Option<InboundMessage>, HubError> {
        let mut log = self.inner.log.lock().unwrap();
        loop {
            if log.closed {
                return Err(HubError::Closed);
            }
            if log.fail_receives {
                return Err(HubError::Transport);
            }
            if let Some(next) = log.inbound.pop_front() {
                return next;
            }
            log = self.inner.cv.wait(log).unwrap();
        }
    }

    fn acknowledge(&self, handle: MessageHandle) -> Result<(), HubError> {
        self.inner.log.lock().unwrap().acked.push(handle);
        Ok(())
    }

    fn reject(&self, handle: MessageHandle) -> Result<(), HubError> {
        self.inner.log.lock().unwrap().rejected.push(handle);
        Ok(())
    }

    fn close(&self) {
        let mut log = self.inner.log.lock().unwrap();
        log.closed = true;
        log.closes += 1;
        self.inner.cv.notify_all();
    }
}
