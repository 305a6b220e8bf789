//! Host-side bridge to a serial-attached microcontroller.
//!
//! blocklink frames commands as line-delimited JSON, pairs every write with
//! the acknowledgement that follows it, hands unsolicited device state to
//! listeners, and reconnects on its own when the serial link drops.
//!
//! # Crate Structure
//!
//! - [`transport`]: Serial and Unix-socket transports
//! - [`frame`]: Envelope codec and line framing
//! - [`session`]: Ack correlation, listeners and reconnection (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use blocklink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use blocklink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use blocklink_session::*;
}
