use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Connector, Transport};

/// Unix domain socket transport.
///
/// Used to talk to device simulators (for example `socat` bridging a pty) and
/// as the fake device in tests. Closing shuts the socket down in both
/// directions, which wakes a reader blocked on a cloned handle with EOF.
impl Transport for UnixStream {
    fn try_clone(&self) -> Result<Self> {
        Ok(UnixStream::try_clone(self)?)
    }

    fn close(&mut self) -> Result<()> {
        match self.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already gone.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Connects to a filesystem-path Unix domain socket.
#[derive(Debug, Clone)]
pub struct UnixSocketConnector {
    path: PathBuf,
}

impl UnixSocketConnector {
    /// Create a connector for the socket at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for UnixSocketConnector {
    type Stream = UnixStream;

    fn open(&self) -> Result<UnixStream> {
        debug!(path = ?self.path, "connecting to unix socket");
        let stream = UnixStream::connect(&self.path).map_err(|e| TransportError::Open {
            path: self.path.clone(),
            source: e,
        })?;
        info!(path = ?self.path, "connected to unix socket");
        Ok(stream)
    }

    fn describe(&self) -> String {
        format!("unix:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::os::unix::net::UnixListener;
    use std::thread;

    use super::*;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/blt-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("device.sock")
    }

    #[test]
    fn connect_and_exchange_line() {
        let sock_path = make_sock_path("connect");
        let listener = UnixListener::bind(&sock_path).expect("listener should bind");

        let device = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept should succeed");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("read line");
            let mut stream = stream;
            stream.write_all(line.as_bytes()).expect("echo line");
        });

        let connector = UnixSocketConnector::new(&sock_path);
        let mut stream = connector.open().expect("connector should open");
        stream.write_all(b"{}\n").expect("write should succeed");

        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).expect("read echo");
        assert_eq!(&buf, b"{}\n");

        device.join().expect("device thread should finish");
        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn open_missing_socket_is_open_error() {
        let connector = UnixSocketConnector::new("/tmp/blocklink-no-such-dir/device.sock");
        let err = connector.open().unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
        assert!(connector.describe().starts_with("unix:"));
    }

    #[test]
    fn close_wakes_reader_on_clone() {
        let (host, _device) = UnixStream::pair().expect("pair");
        let mut reader = Transport::try_clone(&host).expect("clone should succeed");

        let blocked = thread::spawn(move || {
            let mut buf = [0u8; 16];
            reader.read(&mut buf).expect("read should return")
        });

        let mut host = host;
        host.close().expect("close should succeed");
        assert_eq!(blocked.join().expect("reader thread"), 0);
    }

    #[test]
    fn close_twice_is_ok() {
        let (mut host, device) = UnixStream::pair().expect("pair");
        drop(device);
        host.close().expect("first close");
        host.close().expect("second close");
    }
}
