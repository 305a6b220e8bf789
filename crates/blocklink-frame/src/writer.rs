use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::codec::{encode_envelope, Envelope, LINE_TERMINATOR};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes envelopes as terminated lines to any `Write` stream.
pub struct LineWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> LineWriter<T> {
    /// Create a new line writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode and send one envelope followed by the line terminator (blocking).
    pub fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.buf.clear();
        self.buf.put_slice(&encode_envelope(envelope)?);
        trace!(line = %String::from_utf8_lossy(&self.buf), "outgoing");
        self.buf.put_u8(LINE_TERMINATOR);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
