use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Connector, Transport};

/// Baud rate of the shield's UART.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout.
///
/// Reads never block longer than this, so the read loop regularly gets a
/// chance to observe shutdown.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens a named serial device at a fixed baud rate.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    path: PathBuf,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    /// Create a connector for `path` at `baud_rate`.
    pub fn new(path: impl AsRef<Path>, baud_rate: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Override the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Device path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Configured read timeout.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl Connector for SerialConnector {
    type Stream = SerialStream;

    fn open(&self) -> Result<SerialStream> {
        let port = serialport::new(self.path.to_string_lossy(), self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| TransportError::Open {
                path: self.path.clone(),
                source: e.into(),
            })?;

        info!(path = ?self.path, baud = self.baud_rate, "opened serial port");
        Ok(SerialStream {
            port: Some(port),
            path: self.path.clone(),
        })
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path.display(), self.baud_rate)
    }
}

/// An open serial port.
pub struct SerialStream {
    port: Option<Box<dyn serialport::SerialPort>>,
    path: PathBuf,
}

impl SerialStream {
    fn port_mut(&mut self) -> std::io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotConnected))
    }

    /// Device path this stream was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port_mut()?.read(buf)
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port_mut()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port_mut()?.flush()
    }
}

impl Transport for SerialStream {
    fn try_clone(&self) -> Result<Self> {
        let port = self.port.as_ref().ok_or(TransportError::Shutdown)?;
        Ok(Self {
            port: Some(port.try_clone()?),
            path: self.path.clone(),
        })
    }

    // The OS closes the descriptor when the last handle drops. A reader on a
    // cloned handle wakes up at its next read timeout.
    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!(path = ?self.path, "closed serial port handle");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("path", &self.path)
            .field("open", &self.port.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_defaults() {
        let connector = SerialConnector::new("/dev/ttyAMA0", DEFAULT_BAUD_RATE);
        assert_eq!(connector.path(), Path::new("/dev/ttyAMA0"));
        assert_eq!(connector.baud_rate(), 9600);
        assert_eq!(connector.read_timeout(), DEFAULT_READ_TIMEOUT);
        assert_eq!(connector.describe(), "/dev/ttyAMA0@9600");
    }

    #[test]
    fn with_read_timeout_overrides_default() {
        let connector = SerialConnector::new("/dev/ttyUSB0", 115_200)
            .with_read_timeout(Duration::from_millis(5));
        assert_eq!(connector.read_timeout(), Duration::from_millis(5));
    }

    #[test]
    fn open_missing_device_reports_path() {
        let connector = SerialConnector::new("/dev/blocklink-does-not-exist", 9600);
        let err = connector.open().unwrap_err();
        match err {
            TransportError::Open { path, .. } => {
                assert_eq!(path, PathBuf::from("/dev/blocklink-does-not-exist"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
