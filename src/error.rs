//! Contract violations.
//!
//! Misuse of the dispatcher or the network server (touching a descriptor that
//! was never registered, cancelling a timer that does not exist, ...) is not a
//! runtime condition. It is reported through [`fatal`], which logs the
//! diagnostic and panics with a [`ContractViolation`] payload. Callers built
//! with `panic = "abort"` get process termination; everyone else can trap the
//! payload with [`std::panic::catch_unwind`] and downcast it.

use std::fmt;
use std::os::unix::io::RawFd;

/// API misuse detected by the dispatcher or the network server.
#[derive(Clone, Debug, PartialEq)]
pub enum ContractViolation {
    /// A negative file descriptor was passed to `watch`.
    NegativeDescriptor(RawFd),
    /// The descriptor is not watched by the dispatcher.
    UnknownDescriptor(RawFd),
    /// No timer with this due time and callback is pending.
    NoSuchTimer(f64),
    /// A timer was fired while the timer queue was empty.
    NoPendingTimer,
    /// The descriptor does not name a live connection.
    UnknownConnection(RawFd),
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeDescriptor(fd) => write!(f, "bad file descriptor: {fd}"),
            Self::UnknownDescriptor(fd) => write!(f, "unknown file descriptor: {fd}"),
            Self::NoSuchTimer(due) => write!(f, "no such timer (due {due:.6})"),
            Self::NoPendingTimer => f.write_str("no pending timer"),
            Self::UnknownConnection(fd) => write!(f, "no connection on file descriptor {fd}"),
        }
    }
}

impl std::error::Error for ContractViolation {}

/// Logs `violation` and unwinds with it as the panic payload.
#[track_caller]
pub(crate) fn fatal(violation: ContractViolation) -> ! {
    let location = std::panic::Location::caller();

    tracing::error!(%violation, %location, "contract violation");

    std::panic::panic_any(violation)
}
