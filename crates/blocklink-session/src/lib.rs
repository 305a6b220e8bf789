//! Link session management for the blocklink bridge.
//!
//! This is the "just works" layer. Connect to the microcontroller, write
//! device data and wait for its acknowledgement, and receive every device
//! record it reports. Link drops are recovered in the background.
//!
//! The protocol carries no request ids: at most one write is outstanding at a
//! time, and the next acknowledgement line received is its reply.

pub mod bridge;
pub mod connector;
pub mod correlator;
pub mod error;
pub mod registry;
pub mod session;
pub mod shutdown;
pub mod supervisor;

pub use bridge::{Bridge, BridgeConfig, VERSION_COMMAND, VERSION_QUERY};
pub use connector::{connect_serial, connect_unix};
pub use correlator::{AckRendezvous, PendingWrite, WriteCorrelator};
pub use error::{LinkError, Result};
pub use registry::{Listener, ListenerRegistry};
pub use session::{CloseReason, LinkSession, SessionState};
pub use shutdown::ShutdownSignal;
pub use supervisor::Supervisor;
