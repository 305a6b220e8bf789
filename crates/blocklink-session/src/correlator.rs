use std::io::Write;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use blocklink_frame::{DeviceRecord, Envelope, LineWriter};
use tracing::{debug, warn};

use crate::error::{LinkError, Result};

/// Handoff point between the read loop and the single pending write.
///
/// The write side arms the rendezvous before transmitting; the read loop
/// delivers the next acknowledgement into it without ever blocking. Nothing
/// on the wire ties an acknowledgement to a write, so whichever write is armed
/// when an acknowledgement arrives receives it.
#[derive(Clone, Default)]
pub struct AckRendezvous {
    slot: Arc<Mutex<Option<Sender<Vec<DeviceRecord>>>>>,
}

impl AckRendezvous {
    /// Create an unarmed rendezvous.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the rendezvous for a new write.
    pub fn arm(&self) -> PendingWrite {
        let (tx, rx) = mpsc::channel();
        *self.lock() = Some(tx);
        PendingWrite {
            rx,
            rendezvous: self.clone(),
        }
    }

    /// Hand `ack` to the pending write, if one is waiting.
    ///
    /// Never blocks. Returns `false` when no write is waiting (none was issued,
    /// or it already timed out); the acknowledgement is then dropped.
    pub fn deliver(&self, ack: Vec<DeviceRecord>) -> bool {
        match self.lock().take() {
            Some(tx) => tx.send(ack).is_ok(),
            None => false,
        }
    }

    /// Whether a write is currently waiting.
    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }

    fn disarm(&self) {
        self.lock().take();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Sender<Vec<DeviceRecord>>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for AckRendezvous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckRendezvous")
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// The in-flight state of the one outstanding write.
#[derive(Debug)]
pub struct PendingWrite {
    rx: Receiver<Vec<DeviceRecord>>,
    rendezvous: AckRendezvous,
}

impl PendingWrite {
    /// Block until the acknowledgement arrives or `timeout` elapses.
    pub fn wait(self, timeout: Duration) -> Option<Vec<DeviceRecord>> {
        match self.rx.recv_timeout(timeout) {
            Ok(ack) => Some(ack),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.rendezvous.disarm();
                // The read loop may have delivered between the timeout and the disarm.
                self.rx.try_recv().ok()
            }
        }
    }
}

/// Serializes writes and pairs each one with the next acknowledgement.
///
/// At most one write is in flight at any time; concurrent callers queue on an
/// internal lock, so writes never interleave on the wire. The transport write
/// half is attached and detached by the supervisor as the link comes and goes.
pub struct WriteCorrelator<W> {
    exclusive: Mutex<()>,
    writer: Mutex<Option<LineWriter<W>>>,
    rendezvous: AckRendezvous,
    timeout: Duration,
}

impl<W: Write> WriteCorrelator<W> {
    /// Create a correlator whose writes give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            exclusive: Mutex::new(()),
            writer: Mutex::new(None),
            rendezvous: AckRendezvous::new(),
            timeout,
        }
    }

    /// The rendezvous the read loop delivers acknowledgements into.
    pub fn rendezvous(&self) -> AckRendezvous {
        self.rendezvous.clone()
    }

    /// Attach the write half of a freshly opened transport.
    ///
    /// Returns the previously attached writer, if any.
    pub fn attach(&self, writer: LineWriter<W>) -> Option<LineWriter<W>> {
        self.lock_writer().replace(writer)
    }

    /// Detach the current write half.
    ///
    /// Waits for a transmission in progress to finish, but not for its
    /// acknowledgement.
    pub fn detach(&self) -> Option<LineWriter<W>> {
        self.lock_writer().take()
    }

    /// Whether a transport is attached.
    pub fn is_attached(&self) -> bool {
        self.lock_writer().is_some()
    }

    /// Send `envelope` and wait for its acknowledgement.
    ///
    /// A failed transmission is not reported on its own: no acknowledgement
    /// can follow it, so the caller sees [`LinkError::Timeout`].
    pub fn write(&self, envelope: &Envelope) -> Result<Vec<DeviceRecord>> {
        let _exclusive = self
            .exclusive
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let pending = self.rendezvous.arm();
        self.transmit(envelope);

        match pending.wait(self.timeout) {
            Some(ack) => {
                debug!(records = ack.len(), "write acknowledged");
                Ok(ack)
            }
            None => {
                warn!(timeout = ?self.timeout, "write timed out waiting for acknowledgement");
                Err(LinkError::Timeout(self.timeout))
            }
        }
    }

    fn transmit(&self, envelope: &Envelope) {
        let mut writer = self.lock_writer();
        match writer.as_mut() {
            Some(writer) => {
                if let Err(err) = writer.send(envelope) {
                    warn!(error = %err, "failed to transmit envelope");
                }
            }
            None => warn!("no transport attached, write will time out"),
        }
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, Option<LineWriter<W>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W> std::fmt::Debug for WriteCorrelator<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCorrelator")
            .field("rendezvous", &self.rendezvous)
            .field("timeout", &self.timeout)
            .finish()
    }
}
