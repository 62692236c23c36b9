//! Unified error types for the LevelWatch monitor.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! control loop's error handling uniform.  All variants are `Copy` so they
//! can be passed between the sampling, control, and link threads without
//! allocation.
//!
//! None of these faults is process-fatal on its own; the only fatal case
//! (no sampling bus at startup) is decided by the binary before the loop
//! is constructed.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the monitor funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A bus transaction with the ADC failed.  Retried on the next tick.
    Bus(BusFault),
    /// The hub could not be reached or refused the session.
    Connect(ConnectFault),
    /// A send on a connected session failed.  The record is dropped.
    Publish(PublishFault),
    /// An inbound hub message could not be decoded or handled.
    MalformedCommand(CommandError),
    /// The alarm output could not be driven.
    Actuator(ActuatorError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Connect(e) => write!(f, "connect: {e}"),
            Self::Publish(e) => write!(f, "publish: {e}"),
            Self::MalformedCommand(e) => write!(f, "malformed command: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Bus faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    /// The full-duplex transfer returned an error.
    TransferFailed,
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferFailed => write!(f, "SPI transfer failed"),
        }
    }
}

impl From<BusFault> for Error {
    fn from(e: BusFault) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Connect faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFault {
    /// The hub endpoint did not answer.
    Unreachable,
    /// The hub rejected the device credentials.
    Unauthorized,
    /// Another connect attempt is already in flight.
    AttemptInFlight,
    /// Host name or shared access key is not provisioned.
    MissingCredentials,
    /// The link was shut down while the attempt was in flight.
    Cancelled,
}

impl fmt::Display for ConnectFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => write!(f, "hub unreachable"),
            Self::Unauthorized => write!(f, "hub rejected credentials"),
            Self::AttemptInFlight => write!(f, "connect attempt already in flight"),
            Self::MissingCredentials => write!(f, "hub credentials not provisioned"),
            Self::Cancelled => write!(f, "connect cancelled by shutdown"),
        }
    }
}

impl From<ConnectFault> for Error {
    fn from(e: ConnectFault) -> Self {
        Self::Connect(e)
    }
}

// ---------------------------------------------------------------------------
// Publish faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFault {
    /// The record could not be serialised.
    Encode,
    /// The session refused or failed the send.
    SendFailed,
}

impl fmt::Display for PublishFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => write!(f, "payload encoding failed"),
            Self::SendFailed => write!(f, "send on session failed"),
        }
    }
}

impl From<PublishFault> for Error {
    fn from(e: PublishFault) -> Self {
        Self::Publish(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Payload bytes are not UTF-8.
    InvalidUtf8,
    /// Payload is not well-formed JSON.
    InvalidJson,
    /// JSON is well-formed but fields are absent or mistyped.
    InvalidShape,
    /// A known command arrived without a required parameter.
    MissingParameter(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUtf8 => write!(f, "payload is not UTF-8"),
            Self::InvalidJson => write!(f, "payload is not valid JSON"),
            Self::InvalidShape => write!(f, "fields absent or mistyped"),
            Self::MissingParameter(name) => write!(f, "missing parameter '{name}'"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::MalformedCommand(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// No controllable output line was opened at startup.
    Unavailable,
    /// GPIO set failed.
    GpioWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "no output line available"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}
