//! Error types of the btled client stack

use crate::cmd::Command;
use thiserror::Error;

/// Errors of the client stack
///
/// The transport and framing layers produce the connection errors and the local misuse errors
/// (`NotReady`, `FrameTooLarge`, `PayloadTooLarge`). Command level failures, a daemon reporting
/// a non-zero status or a response not arriving before its deadline, are returned by the command
/// methods of a [`Session`](crate::cmd::Session) the same way so a caller can match on them.
#[derive(Debug, Error)]
pub enum Error {
    /// The socket to the daemon could not be opened or failed while in use
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The MTU was never negotiated with the daemon
    #[error("transport not ready, the MTU was not negotiated")]
    NotReady,

    /// A frame is larger than the negotiated MTU
    #[error("frame of {len} bytes is larger than the MTU ({mtu})")]
    FrameTooLarge { len: usize, mtu: usize },

    /// A request payload and its header do not fit in one frame
    #[error("payload of {len} bytes does not fit within a frame (MTU {mtu})")]
    PayloadTooLarge { len: usize, mtu: usize },

    /// No response was received for the command before its timeout
    #[error("timeout waiting for the response to {0}")]
    Timeout(Command),

    /// The daemon responded with a non-zero status
    #[error("{command} failed: {reason} ({status})")]
    Daemon {
        command: Command,
        status: DaemonStatus,
        reason: String,
    },

    /// A response body did not match the layout of its command
    #[error("malformed response to {command}: {reason}")]
    MalformedResponse { command: Command, reason: &'static str },

    /// No characteristic within the attribute database matches the UUID
    #[error("uuid {0} not found")]
    NotFound(String),

    /// The characteristic already has an active subscription
    #[error("subscription already exists for {0}")]
    AlreadySubscribed(String),

    /// The characteristic has no active subscription
    #[error("no subscription for {0}")]
    NotSubscribed(String),

    /// A command parameter is out of the range accepted by the daemon
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The session was closed
    #[error("session closed")]
    Closed,

    /// The UUID name table could not be loaded
    #[error("uuid name table: {0}")]
    UuidNames(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error ends the connection to the daemon
    ///
    /// There is no reconnection, a new session must be created after a fatal error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Closed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The status returned by the daemon in a response
///
/// `Success` is never part of an error. Status codes that the daemon forwards from the kernel
/// Bluetooth management interface are not mapped and are kept as `UnknownCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Success,
    InvalidState,
    InvalidArgument,
    NullArgument,
    Timeout,
    Busy,
    Already,
    Internal,
    Empty,
    NotImplemented,
    UnknownCode(u8),
}

impl DaemonStatus {
    /// Create a `DaemonStatus`
    ///
    /// This only returns a status if the raw value is zero, otherwise the error status is
    /// returned.
    pub fn try_from_raw(raw: u8) -> std::result::Result<Self, Self> {
        match raw {
            0 => Ok(DaemonStatus::Success),
            1 => Err(DaemonStatus::InvalidState),
            2 => Err(DaemonStatus::InvalidArgument),
            3 => Err(DaemonStatus::NullArgument),
            4 => Err(DaemonStatus::Timeout),
            5 => Err(DaemonStatus::Busy),
            6 => Err(DaemonStatus::Already),
            7 => Err(DaemonStatus::Internal),
            8 => Err(DaemonStatus::Empty),
            9 => Err(DaemonStatus::NotImplemented),
            _ => Err(DaemonStatus::UnknownCode(raw)),
        }
    }

    /// Get the raw status code
    pub fn code(&self) -> u8 {
        match self {
            DaemonStatus::Success => 0,
            DaemonStatus::InvalidState => 1,
            DaemonStatus::InvalidArgument => 2,
            DaemonStatus::NullArgument => 3,
            DaemonStatus::Timeout => 4,
            DaemonStatus::Busy => 5,
            DaemonStatus::Already => 6,
            DaemonStatus::Internal => 7,
            DaemonStatus::Empty => 8,
            DaemonStatus::NotImplemented => 9,
            DaemonStatus::UnknownCode(v) => *v,
        }
    }
}

impl std::fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::InvalidState => f.write_str("invalid state"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::NullArgument => f.write_str("null argument"),
            Self::Timeout => f.write_str("timeout"),
            Self::Busy => f.write_str("busy"),
            Self::Already => f.write_str("already in progress"),
            Self::Internal => f.write_str("internal error"),
            Self::Empty => f.write_str("empty"),
            Self::NotImplemented => f.write_str("not implemented"),
            Self::UnknownCode(v) => write!(f, "status code: {v}"),
        }
    }
}
