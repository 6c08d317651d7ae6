//! Kinescope Bus
//!
//! An in-process, address-based request/reply bus. Workers bind handlers to
//! addresses and talk to each other only by sending requests through the bus,
//! never by sharing state.
//!
//! # Overview
//!
//! - [`Postbox`] - a typed address; the request type fixes the response and
//!   failure types of the operation
//! - [`Bus`] - the registry of bound addresses, cloned into every worker
//! - [`MailboxOptions`] - how many handler invocations a mailbox runs at once
//! - [`BusError`] - every way a request can fail
//!
//! Each bound address owns an unbounded FIFO mailbox drained by its own loop
//! task, so a slow handler on one address never holds up another.
//!
//! # Example
//!
//! ```ignore
//! use kinescope_bus::{Bus, Postbox, Request};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Ping(u32);
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Pong(u32);
//!
//! impl Request for Ping {
//!     type Response = Pong;
//!     type Error = std::io::Error;
//! }
//!
//! const PING: Postbox<Ping> = Postbox::new("ping");
//!
//! let bus = Bus::new();
//! bus.register(&PING, |Ping(n)| async move { Ok(Pong(n)) })?;
//!
//! let Pong(n) = bus.request(&PING, Ping(7), Duration::from_secs(1)).await?;
//! assert_eq!(n, 7);
//!
//! bus.shutdown().await;
//! ```

mod bus;
pub mod error;
mod mailbox;
pub mod postbox;

pub use bus::Bus;
pub use error::{BusError, RegisterError};
pub use mailbox::MailboxOptions;
pub use postbox::{Postbox, Request};
