//! Hub capability: the boundary to the vendor device SDK.
//!
//! The link logic is generic over [`HubClient`], so swapping the real SDK
//! for the simulated hub (or a test double) requires zero changes to
//! [`CloudLink`](super::link::CloudLink).  Transport security, wire-level
//! retry, and delivery guarantees belong to the implementation.
//!
//! Sessions are shared between the control thread (sends) and the link
//! thread (blocking receive), so every session method takes `&self`.

use core::fmt;

/// Opaque token the hub uses to identify one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub u64);

/// One inbound delivery: payload bytes plus the handle to settle it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub handle: MessageHandle,
    pub payload: Vec<u8>,
}

/// Everything needed to open a session.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host_name: String,
    pub device_id: String,
    pub shared_access_key: String,
}

impl ConnectionDescriptor {
    /// `HostName=..;DeviceId=..;SharedAccessKey=..` form used by the hub SDK.
    pub fn connection_string(&self) -> String {
        format!(
            "HostName={};DeviceId={};SharedAccessKey={}",
            self.host_name, self.device_id, self.shared_access_key
        )
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host_name", &self.host_name)
            .field("device_id", &self.device_id)
            .field("shared_access_key", &"<redacted>")
            .finish()
    }
}

/// Errors reported by a hub implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// The endpoint could not be reached.
    Unreachable,
    /// Credentials were refused.
    Unauthorized,
    /// The session was closed locally or by the hub.
    Closed,
    /// Outbound queue is full.
    Busy,
    /// Any other transport failure.
    Transport,
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => write!(f, "hub unreachable"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Closed => write!(f, "session closed"),
            Self::Busy => write!(f, "outbound queue full"),
            Self::Transport => write!(f, "transport error"),
        }
    }
}

/// Session factory.
pub trait HubClient: Send + Sync + 'static {
    type Session: HubSession;

    /// Open a session.  May block for the duration of the handshake.
    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Self::Session, HubError>;
}

/// A live session.
pub trait HubSession: Send + Sync + 'static {
    /// Hand one message to the SDK for delivery.  Must not wait for the
    /// hub to confirm delivery.
    fn send(&self, payload: &[u8]) -> Result<(), HubError>;

    /// Block until the next inbound message.
    ///
    /// `Ok(None)` means nothing arrived this round and the caller asks
    /// again straight away, without sleeping.  An implementation may only
    /// return it after blocking for a while itself (an SDK poll timeout,
    /// say); returning it immediately turns the receive loop into a busy
    /// spin.  After [`close`](Self::close) a pending or future call
    /// returns `Err(HubError::Closed)`.
    fn receive(&self) -> Result<Option<InboundMessage>, HubError>;

    /// Tell the hub the message was processed and may be discarded.
    fn acknowledge(&self, handle: MessageHandle) -> Result<(), HubError>;

    /// Tell the hub the message could not be processed.
    fn reject(&self, handle: MessageHandle) -> Result<(), HubError>;

    /// Release the session and unblock any pending `receive`.
    fn close(&self);
}
