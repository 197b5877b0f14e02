//! Outcome codes shared by every entry point of the crate.
//!
//! `Status` is the crate's error currency: fallible operations return
//! `Result<T, Status>`, and completion callbacks receive a `Status` telling
//! them how the underlying operation ended. The set is closed; applications
//! can match on it exhaustively and rely on [`Status::as_str`] staying
//! stable across releases for logs and diagnostics.

use std::io;

/// Outcome of an engine or socket operation.
///
/// The first two variants (`Ok`, `Pending`) are non-error outcomes; they
/// appear in callback arguments but are never returned through the `Err`
/// side of a `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Status {
    /// No errors.
    #[error("no errors")]
    Ok,
    /// Waiting for an operation to complete.
    #[error("waiting for an operation to complete")]
    Pending,
    /// Shut down or shutting down.
    #[error("shut down or shutting down")]
    Terminate,
    /// The operation would block if it was not asynchronous.
    #[error("the operation would block if it was not asynchronous")]
    WouldBlock,
    /// The requested item was not found.
    #[error("the requested item was not found")]
    NotFound,
    /// The requested operation was not recognized.
    #[error("the requested operation was not recognized")]
    NotRecognized,
    /// The requested operation was recognized but not supported.
    #[error("the requested operation was recognized but not supported")]
    NotSupported,
    /// The value of a parameter is not supported or usable.
    #[error("the value of a parameter is not supported or usable")]
    BadInput,
    /// The operation was aborted externally.
    #[error("the operation was aborted externally")]
    Aborted,
    /// An operation is already underway.
    #[error("an operation is already underway")]
    Busy,
    /// Incomplete data was found.
    #[error("incomplete data was found")]
    Partial,
    /// Attempt to access data out of bounds.
    #[error("attempt to access data out of bounds")]
    OutOfBounds,
    /// A timeout expired while waiting for an operation to complete.
    #[error("a timeout expired while waiting for an operation to complete")]
    Timeout,
    /// A required handle or reference was missing or stale.
    #[error("a required handle or reference was missing or stale")]
    NullReference,
    /// Insufficient or bad resource.
    #[error("insufficient or bad resource")]
    NoResource,
    /// Creation or configuration of a resource failed.
    #[error("creation or configuration of a resource failed")]
    SetupFailure,
    /// Something went wrong inside the engine.
    #[error("something went wrong inside the engine")]
    InternalFailure,
    /// A failure was reported from outside the engine.
    #[error("a failure was reported from outside the engine")]
    ExternalFailure,
    /// Operation is not allowed.
    #[error("operation is not allowed")]
    NotAllowed,
}

impl Status {
    /// Returns the stable short name of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Pending => "pending",
            Self::Terminate => "terminate",
            Self::WouldBlock => "would-block",
            Self::NotFound => "not-found",
            Self::NotRecognized => "not-recognized",
            Self::NotSupported => "not-supported",
            Self::BadInput => "bad-input",
            Self::Aborted => "aborted",
            Self::Busy => "busy",
            Self::Partial => "partial",
            Self::OutOfBounds => "out-of-bounds",
            Self::Timeout => "timeout",
            Self::NullReference => "null-reference",
            Self::NoResource => "no-resource",
            Self::SetupFailure => "setup-failure",
            Self::InternalFailure => "internal-failure",
            Self::ExternalFailure => "external-failure",
            Self::NotAllowed => "not-allowed",
        }
    }

    /// Returns true for every code except `Ok` and `Pending`.
    #[must_use]
    pub const fn is_err(self) -> bool {
        !matches!(self, Self::Ok | Self::Pending)
    }

    /// Maps an OS error into a status code.
    ///
    /// The mapping is deterministic: transient kinds map to their transient
    /// codes, connection-level failures count as external, and anything
    /// unclassified is an internal failure.
    #[must_use]
    pub fn from_io(err: &io::Error) -> Self {
        use io::ErrorKind;

        match err.kind() {
            ErrorKind::WouldBlock => Self::WouldBlock,
            ErrorKind::TimedOut => Self::Timeout,
            ErrorKind::Interrupted => Self::Aborted,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::InvalidInput | ErrorKind::AddrNotAvailable => Self::BadInput,
            ErrorKind::OutOfMemory => Self::NoResource,
            ErrorKind::PermissionDenied => Self::NotAllowed,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::AddrInUse
            | ErrorKind::UnexpectedEof => Self::ExternalFailure,
            _ => Self::InternalFailure,
        }
    }
}
