use std::io::{ErrorKind, Read};
use std::sync::Arc;

use blocklink_frame::{decode_envelope, FrameError, LineReader};
use tracing::{debug, trace, warn};

use crate::correlator::AckRendezvous;
use crate::registry::ListenerRegistry;
use crate::shutdown::ShutdownSignal;

/// Link session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading from the transport.
    Open,
    /// The transport failed or was closed; the session is finished.
    Closed,
}

/// Why a session's read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The transport reported end-of-stream.
    EndOfStream,
    /// The transport failed in a way further reads cannot recover from.
    ReadFailed(ErrorKind),
    /// The bridge is shutting down.
    Shutdown,
}

/// Owns the read half of one open transport and runs its read loop.
pub struct LinkSession<R> {
    reader: LineReader<R>,
    registry: Arc<ListenerRegistry>,
    rendezvous: AckRendezvous,
    shutdown: Arc<ShutdownSignal>,
    state: SessionState,
}

impl<R: Read> LinkSession<R> {
    /// Bind a session to the read half of a transport.
    pub fn new(
        reader: LineReader<R>,
        registry: Arc<ListenerRegistry>,
        rendezvous: AckRendezvous,
        shutdown: Arc<ShutdownSignal>,
    ) -> Self {
        Self {
            reader,
            registry,
            rendezvous,
            shutdown,
            state: SessionState::Open,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Read and handle lines until the transport closes or shutdown is
    /// requested.
    ///
    /// Malformed lines and isolated read errors are logged and skipped; they
    /// never end the session.
    pub fn run(&mut self) -> CloseReason {
        let reason = loop {
            if self.shutdown.is_triggered() {
                break CloseReason::Shutdown;
            }

            match self.reader.read_line() {
                Ok(line) => self.handle_line(&line),
                Err(FrameError::ConnectionClosed) => break CloseReason::EndOfStream,
                // Read timeout: nothing arrived, go round and check for shutdown.
                Err(FrameError::Io(err))
                    if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(FrameError::Io(err)) if is_link_lost(err.kind()) => {
                    warn!(error = %err, "transport read failed");
                    break CloseReason::ReadFailed(err.kind());
                }
                Err(err) => warn!(error = %err, "failed to read line from transport"),
            }
        };

        self.state = SessionState::Closed;
        reason
    }

    /// Decode one line, hand any acknowledgement to the pending write and
    /// dispatch every record it carries to the listeners.
    pub fn handle_line(&self, line: &[u8]) {
        let envelope = match decode_envelope(line) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(error = %err, line = %String::from_utf8_lossy(line), "discarding malformed line");
                return;
            }
        };
        trace!(?envelope, "incoming");

        if let Some(error) = envelope.error {
            warn!(code = error.code, "microcontroller reported an error");
        }

        if let Some(ack) = &envelope.ack {
            if !self.rendezvous.deliver(ack.clone()) {
                debug!(records = ack.len(), "dropping acknowledgement with no pending write");
            }
        }

        for record in envelope.records() {
            self.registry.dispatch(record);
        }
    }

    /// Consume the session and return the read half of its transport.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

fn is_link_lost(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    use blocklink_frame::{DeviceRecord, Payload};

    use super::*;

    fn collecting_registry(
        listeners: usize,
    ) -> (Arc<ListenerRegistry>, Receiver<(usize, DeviceRecord)>) {
        let registry = Arc::new(ListenerRegistry::new());
        let (tx, rx) = mpsc::channel();
        for id in 0..listeners {
            let tx = tx.clone();
            registry.register(move |record| {
                let _ = tx.send((id, record));
            });
        }
        (registry, rx)
    }

    fn session_over<R: Read>(
        input: R,
        registry: Arc<ListenerRegistry>,
        rendezvous: AckRendezvous,
    ) -> LinkSession<R> {
        LinkSession::new(
            LineReader::new(input),
            registry,
            rendezvous,
            Arc::new(ShutdownSignal::new()),
        )
    }

    fn drain(rx: &Receiver<(usize, DeviceRecord)>, expected: usize) -> Vec<(usize, DeviceRecord)> {
        let mut seen: Vec<_> = (0..expected)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).expect("listener should fire"))
            .collect();
        assert!(
            rx.recv_timeout(Duration::from_millis(100)).is_err(),
            "no extra dispatches expected"
        );
        seen.sort_by_key(|(id, record)| (*id, record.device));
        seen
    }

    #[test]
    fn device_line_reaches_both_listeners() {
        let (registry, rx) = collecting_registry(2);
        let mut session = session_over(
            Cursor::new(b"{\"device\":[{\"G\":\"1\",\"V\":2,\"D\":5,\"DA\":7}]}\n".to_vec()),
            registry,
            AckRendezvous::new(),
        );

        assert_eq!(session.run(), CloseReason::EndOfStream);
        assert_eq!(session.state(), SessionState::Closed);

        let expected = DeviceRecord::new("1", 2, 5, Some(Payload::from(7)));
        assert_eq!(drain(&rx, 2), vec![(0, expected.clone()), (1, expected)]);
    }

    #[test]
    fn ack_is_delivered_and_dispatched() {
        let (registry, rx) = collecting_registry(1);
        let rendezvous = AckRendezvous::new();
        let session = session_over(Cursor::new(Vec::new()), registry, rendezvous.clone());

        let pending = rendezvous.arm();
        session.handle_line(br#"{"ACK":[{"G":"0","V":0,"D":1003,"DA":"1.2.3"}]}"#);

        let expected = DeviceRecord::new("0", 0, 1003, Some("1.2.3".into()));
        assert_eq!(
            pending.wait(Duration::from_secs(2)),
            Some(vec![expected.clone()])
        );
        assert_eq!(drain(&rx, 1), vec![(0, expected)]);
    }

    #[test]
    fn mixed_case_ack_completes_pending_write() {
        let (registry, rx) = collecting_registry(1);
        let rendezvous = AckRendezvous::new();
        let session = session_over(Cursor::new(Vec::new()), registry, rendezvous.clone());

        let pending = rendezvous.arm();
        session.handle_line(br#"{"Ack":[{"g":"0","v":0,"d":1003,"da":"1.2.3"}]}"#);

        let expected = DeviceRecord::new("0", 0, 1003, Some("1.2.3".into()));
        assert_eq!(
            pending.wait(Duration::from_secs(2)),
            Some(vec![expected.clone()])
        );
        assert_eq!(drain(&rx, 1), vec![(0, expected)]);
    }

    #[test]
    fn unmatched_ack_is_dropped_and_loop_continues() {
        let (registry, rx) = collecting_registry(0);
        let rendezvous = AckRendezvous::new();
        let mut session = session_over(
            Cursor::new(b"{\"ACK\":[{\"G\":\"0\",\"V\":0,\"D\":1003,\"DA\":\"1.2.3\"}]}\n{}\n".to_vec()),
            registry,
            rendezvous.clone(),
        );

        assert_eq!(session.run(), CloseReason::EndOfStream);
        assert!(!rendezvous.is_armed());
        drop(session);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn records_in_both_slots_reach_every_listener_once() {
        let (registry, rx) = collecting_registry(2);
        let session = session_over(Cursor::new(Vec::new()), registry, AckRendezvous::new());

        session.handle_line(
            br#"{"device":[{"G":"1","V":0,"D":1}],"ACK":[{"G":"1","V":0,"D":2},{"G":"1","V":0,"D":3}]}"#,
        );

        let seen = drain(&rx, 6);
        for id in 0..2 {
            let devices: Vec<i64> = seen
                .iter()
                .filter(|(listener, _)| *listener == id)
                .map(|(_, record)| record.device)
                .collect();
            assert_eq!(devices, vec![1, 2, 3]);
        }
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (registry, rx) = collecting_registry(1);
        let input = b"garbage\n{\"device\":[{\"G\":\n\n{\"device\":[{\"G\":\"4\",\"V\":1,\"D\":9}]}\n";
        let mut session = session_over(Cursor::new(input.to_vec()), registry, AckRendezvous::new());

        assert_eq!(session.run(), CloseReason::EndOfStream);
        let seen = drain(&rx, 1);
        assert_eq!(seen[0].1.group, "4");
    }

    #[test]
    fn transient_read_errors_do_not_end_session() {
        let (registry, rx) = collecting_registry(1);
        let input = ScriptedReader::new(vec![
            Err(ErrorKind::Other),
            Err(ErrorKind::InvalidData),
            Ok(b"{\"device\":[{\"G\":\"2\",\"V\":0,\"D\":3}]}\n".to_vec()),
        ]);
        let mut session = session_over(input, registry, AckRendezvous::new());

        assert_eq!(session.run(), CloseReason::EndOfStream);
        assert_eq!(drain(&rx, 1)[0].1.group, "2");
    }

    #[test]
    fn lost_link_closes_session() {
        let (registry, _rx) = collecting_registry(0);
        let input = ScriptedReader::new(vec![Err(ErrorKind::BrokenPipe)]);
        let mut session = session_over(input, registry, AckRendezvous::new());

        assert_eq!(session.run(), CloseReason::ReadFailed(ErrorKind::BrokenPipe));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn shutdown_is_observed_between_read_timeouts() {
        let (registry, _rx) = collecting_registry(0);
        let shutdown = Arc::new(ShutdownSignal::new());
        let mut session = LinkSession::new(
            LineReader::new(AlwaysTimedOut {
                shutdown: Arc::clone(&shutdown),
                reads: 0,
            }),
            registry,
            AckRendezvous::new(),
            shutdown,
        );

        assert_eq!(session.run(), CloseReason::Shutdown);
    }

    /// Replays a scripted sequence of reads, then reports end-of-stream.
    struct ScriptedReader {
        steps: std::collections::VecDeque<std::result::Result<Vec<u8>, ErrorKind>>,
    }

    impl ScriptedReader {
        fn new(steps: Vec<std::result::Result<Vec<u8>, ErrorKind>>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Err(kind)) => Err(std::io::Error::from(kind)),
                Some(Ok(bytes)) => {
                    assert!(bytes.len() <= buf.len());
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
            }
        }
    }

    /// Times out on every read and requests shutdown on the third.
    struct AlwaysTimedOut {
        shutdown: Arc<ShutdownSignal>,
        reads: usize,
    }

    impl Read for AlwaysTimedOut {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            if self.reads == 3 {
                self.shutdown.trigger();
            }
            Err(std::io::Error::from(ErrorKind::TimedOut))
        }
    }
}
