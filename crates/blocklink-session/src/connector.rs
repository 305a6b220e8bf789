use std::path::Path;

use blocklink_transport::SerialConnector;
#[cfg(unix)]
use blocklink_transport::UnixSocketConnector;

use crate::bridge::{Bridge, BridgeConfig};
use crate::error::Result;
use crate::registry::Listener;

/// Connect to the microcontroller on a serial device.
///
/// Uses the default [`BridgeConfig`]: 2 s acknowledgement timeout, 1 s
/// reconnect backoff.
pub fn connect_serial(
    path: impl AsRef<Path>,
    baud_rate: u32,
    listeners: Vec<Listener>,
) -> Result<Bridge<SerialConnector>> {
    Bridge::connect(
        SerialConnector::new(path, baud_rate),
        BridgeConfig::default(),
        listeners,
    )
}

/// Connect to a device simulator listening on a Unix domain socket.
#[cfg(unix)]
pub fn connect_unix(
    path: impl AsRef<Path>,
    listeners: Vec<Listener>,
) -> Result<Bridge<UnixSocketConnector>> {
    Bridge::connect(
        UnixSocketConnector::new(path),
        BridgeConfig::default(),
        listeners,
    )
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixListener;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use blocklink_frame::{decode_envelope, DeviceRecord, LineReader};
    use blocklink_transport::TransportError;

    use super::*;
    use crate::error::LinkError;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/bls-{}-{}-{}",
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
    fn connect_unix_get_version() {
        let sock_path = make_sock_path("version");
        let listener = UnixListener::bind(&sock_path).expect("listener should bind");

        let device = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("device should accept");
            let mut out = stream.try_clone().expect("clone");
            let mut reader = LineReader::new(stream);

            out.write_all(b"{\"device\":[{\"G\":\"0\",\"V\":0,\"D\":2,\"DA\":1}]}\n")
                .expect("unsolicited write");

            let line = reader.read_line().expect("version query");
            let query = decode_envelope(&line).expect("valid envelope");
            assert_eq!(query.device.unwrap()[0].device, 1003);
            out.write_all(b"{\"ACK\":[{\"G\":\"0\",\"V\":0,\"D\":1003,\"DA\":\"1.2.3\"}]}\n")
                .expect("ack write");
        });

        let (tx, rx) = mpsc::channel();
        let printer: Listener = Arc::new(move |record: DeviceRecord| {
            let _ = tx.send(record);
        });

        let bridge = connect_unix(&sock_path, vec![printer]).expect("bridge should connect");
        assert_eq!(bridge.get_version().expect("version"), "1.2.3");

        let mut devices: Vec<i64> = (0..2)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap().device)
            .collect();
        devices.sort();
        assert_eq!(devices, vec![2, 1003]);

        device.join().expect("device thread should finish");
        drop(bridge);
        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn connect_serial_bad_path_fails() {
        let err = connect_serial("/dev/blocklink-missing", 9600, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            LinkError::Transport(TransportError::Open { .. })
        ));
    }
}
