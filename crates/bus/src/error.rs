use std::time::Duration;

use thiserror::Error;

/// Errors returned to the caller of [`Bus::request`](crate::Bus::request)
#[derive(Error, Debug)]
pub enum BusError<E> {
    /// Nothing is registered at the address
    #[error("No handler bound at address {0}")]
    NoHandlerBound(String),

    /// The handler ran and returned an error
    #[error("{cause}")]
    HandlerFailed {
        address: String,
        #[source]
        cause: E,
    },

    /// No reply arrived before the caller's deadline
    #[error("No reply from {address} within {}ms", timeout.as_millis())]
    Timeout { address: String, timeout: Duration },

    /// The handler went away without replying (panic or shutdown)
    #[error("Handler at {0} dropped the request without replying")]
    Dropped(String),

    /// The address is bound to a different request type
    #[error("Address {address} expects {expected}, got {actual}")]
    PayloadMismatch {
        address: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl<E> BusError<E> {
    /// Address the failed request was sent to
    pub fn address(&self) -> &str {
        match self {
            BusError::NoHandlerBound(address) | BusError::Dropped(address) => address,
            BusError::HandlerFailed { address, .. }
            | BusError::Timeout { address, .. }
            | BusError::PayloadMismatch { address, .. } => address,
        }
    }

    /// The handler's own error, if the handler ran and failed
    pub fn cause(&self) -> Option<&E> {
        match self {
            BusError::HandlerFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// Errors returned by [`Bus::register`](crate::Bus::register)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("Address {0} already has a handler bound")]
    AddressInUse(String),
}
