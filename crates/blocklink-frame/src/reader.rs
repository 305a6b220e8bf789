use std::io::{ErrorKind, Read};

use bytes::{Buf, Bytes, BytesMut};

use crate::codec::{FrameConfig, LINE_TERMINATOR};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 256;

/// Reads complete lines from any `Read` stream.
///
/// Handles partial reads internally: callers always get whole lines, without
/// the terminator.
pub struct LineReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    /// Set after an over-long line; bytes are dropped up to the next terminator.
    discarding: bool,
}

impl<T: Read> LineReader<T> {
    /// Create a new line reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new line reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            discarding: false,
        }
    }

    /// Read the next complete line (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. A
    /// partial line buffered at EOF is dropped.
    pub fn read_line(&mut self) -> Result<Bytes> {
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(line);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                self.buf.clear();
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn take_line(&mut self) -> Result<Option<Bytes>> {
        let terminator = self.buf.iter().position(|&b| b == LINE_TERMINATOR);

        if self.discarding {
            match terminator {
                Some(pos) => {
                    self.buf.advance(pos + 1);
                    self.discarding = false;
                    return self.take_line();
                }
                None => {
                    self.buf.clear();
                    return Ok(None);
                }
            }
        }

        match terminator {
            Some(pos) if pos > self.config.max_line_len => {
                self.buf.advance(pos + 1);
                Err(FrameError::LineTooLong {
                    max: self.config.max_line_len,
                })
            }
            Some(pos) => {
                let line = self.buf.split_to(pos).freeze();
                self.buf.advance(1);
                Ok(Some(line))
            }
            None if self.buf.len() > self.config.max_line_len => {
                self.buf.clear();
                self.discarding = true;
                Err(FrameError::LineTooLong {
                    max: self.config.max_line_len,
                })
            }
            None => Ok(None),
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

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current line reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
