//! Typed addresses.

use std::{fmt, marker::PhantomData};

use serde::{Serialize, de::DeserializeOwned};

/// A payload that can be sent over the bus.
///
/// Every request type names exactly one response type and one failure type,
/// so an address bound to `R` always answers with
/// `Result<R::Response, R::Error>`.
pub trait Request: Serialize + DeserializeOwned + fmt::Debug + Send + 'static {
    /// Payload returned by the handler on success
    type Response: Serialize + DeserializeOwned + fmt::Debug + Send + 'static;

    /// Failure raised by the handler, delivered to the caller verbatim
    type Error: std::error::Error + Send + 'static;
}

/// An address on the bus, typed by the request it accepts.
///
/// Postboxes are usually declared as constants next to the request types:
///
/// ```ignore
/// pub const PB_LIST_STREAMS: Postbox<ListStreams> = Postbox::new("kinesis.list-streams");
/// ```
pub struct Postbox<R> {
    address: &'static str,
    _request: PhantomData<fn(R) -> R>,
}

impl<R: Request> Postbox<R> {
    pub const fn new(address: &'static str) -> Self {
        Self {
            address,
            _request: PhantomData,
        }
    }
}

impl<R> Postbox<R> {
    /// The untyped address this postbox routes to
    pub fn address(&self) -> &'static str {
        self.address
    }
}

impl<R> Clone for Postbox<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Postbox<R> {}

impl<R> fmt::Debug for Postbox<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Postbox")
            .field("address", &self.address)
            .field("request", &std::any::type_name::<R>())
            .finish()
    }
}

impl<R> fmt::Display for Postbox<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.address)
    }
}
