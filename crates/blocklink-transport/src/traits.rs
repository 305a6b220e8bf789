use std::io::{Read, Write};

use crate::error::Result;

/// A connected duplex byte stream to the microcontroller.
///
/// The bridge splits every stream with [`Transport::try_clone`]: one handle is
/// read by the link session, the other is written by the write correlator.
pub trait Transport: Read + Write + Send + Sized + 'static {
    /// Create a second handle to the same underlying stream.
    fn try_clone(&self) -> Result<Self>;

    /// Close the stream.
    ///
    /// Closing must cause a read blocked on another handle of the same stream
    /// to return, either with end-of-stream or with a read timeout.
    fn close(&mut self) -> Result<()>;
}

/// Opens fresh [`Transport`] streams, once on connect and again after every
/// link failure.
pub trait Connector: Send + Sync + 'static {
    type Stream: Transport;

    /// Open a new stream.
    fn open(&self) -> Result<Self::Stream>;

    /// Human-readable description of the endpoint, used in logs.
    fn describe(&self) -> String;
}
