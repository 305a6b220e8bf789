//! Transport boundary for the blocklink microcontroller bridge.
//!
//! The bridge only needs a duplex byte stream that can be split into a read
//! half and a write half, plus a way to (re)open it:
//! - Serial ports (the microcontroller shield)
//! - Unix domain sockets (device simulators, tests)
//!
//! This is the lowest layer of blocklink. Everything else builds on top of
//! the [`Transport`] and [`Connector`] traits provided here.

pub mod error;
pub mod serial;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use serial::{SerialConnector, SerialStream, DEFAULT_BAUD_RATE};
pub use traits::{Connector, Transport};

#[cfg(unix)]
pub use uds::UnixSocketConnector;
