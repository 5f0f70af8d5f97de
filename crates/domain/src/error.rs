//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`BridgeError`]
//! via `#[from]` (or an `into_domain()` helper for adapter errors), so the
//! source chain survives all the way to the log line.

/// Top-level error for everything that can go wrong while handling a message
/// or running a background job.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Input did not satisfy a domain invariant.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A referenced device, command or macro does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// Talking to the hardware failed.
    #[error("device error")]
    Device(#[from] DeviceError),

    /// The command store failed to read or write.
    #[error("command store error")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The message bus rejected or could not deliver a publish.
    #[error("bus error")]
    Bus(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Invariant violations detected while parsing input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// A command name was empty.
    #[error("command name must not be empty")]
    EmptyCommandName,

    /// A command name contained an empty, `.` or `..` segment.
    #[error("command name segment {0:?} is not allowed")]
    InvalidCommandSegment(String),

    /// A socket index was not a number or out of range.
    #[error("invalid socket index {0:?}")]
    InvalidSocket(String),

    /// A percentage was not a number in `0..=100`.
    #[error("invalid percentage {0:?}")]
    InvalidPercentage(String),

    /// A macro line started with `pause` but had no valid duration.
    #[error("invalid pause directive {0:?}")]
    InvalidPause(String),

    /// A stored signal was not valid hex.
    #[error("invalid hex signal")]
    InvalidSignal(#[source] hex::FromHexError),

    /// A device type string did not name a supported family.
    #[error("unknown device type {0:?}")]
    UnknownDeviceType(String),

    /// A MAC address could not be parsed.
    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),

    /// A device subprefix was empty, missing its trailing `/`, or reserved.
    #[error("invalid device subprefix {0:?}")]
    InvalidSubprefix(String),

    /// Two devices resolved to the same subprefix.
    #[error("duplicate device subprefix {0:?}")]
    DuplicateSubprefix(String),
}

/// A lookup by name or reference found nothing.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    /// Kind of thing that was looked up (e.g. `"Command"`).
    pub entity: &'static str,
    /// The identifier used for the lookup.
    pub id: String,
}

/// Failures reported by a device transport.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Reading from or writing to the device failed.
    #[error("device I/O failed")]
    Io(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The device did not answer in time.
    #[error("device did not respond in time")]
    Timeout,

    /// The device rejected the authentication handshake.
    #[error("device authentication failed")]
    Auth,

    /// The device family has no such operation.
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),
}
