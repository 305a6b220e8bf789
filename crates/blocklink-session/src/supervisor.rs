use std::sync::Arc;

use blocklink_frame::{FrameConfig, LineReader, LineWriter};
use blocklink_transport::{Connector, Transport};
use tracing::{debug, info, warn};

use crate::bridge::BridgeConfig;
use crate::correlator::WriteCorrelator;
use crate::registry::ListenerRegistry;
use crate::session::{CloseReason, LinkSession};
use crate::shutdown::ShutdownSignal;

/// Keeps a link session running across transport failures.
///
/// Each iteration runs one session until it closes, closes its transport,
/// waits out the backoff and reopens. Reopen failures are retried after
/// another backoff; only shutdown ends the loop.
pub struct Supervisor<C: Connector> {
    connector: C,
    correlator: Arc<WriteCorrelator<C::Stream>>,
    registry: Arc<ListenerRegistry>,
    shutdown: Arc<ShutdownSignal>,
    config: BridgeConfig,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(
        connector: C,
        correlator: Arc<WriteCorrelator<C::Stream>>,
        registry: Arc<ListenerRegistry>,
        shutdown: Arc<ShutdownSignal>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            connector,
            correlator,
            registry,
            shutdown,
            config,
        }
    }

    /// Open a fresh transport and bind a session to it.
    pub fn open(&self) -> blocklink_transport::Result<LinkSession<C::Stream>> {
        let stream = self.connector.open()?;
        self.bind(stream)
    }

    /// Split `stream`: the write half goes to the correlator, the read half
    /// to a new session.
    pub fn bind(&self, stream: C::Stream) -> blocklink_transport::Result<LinkSession<C::Stream>> {
        let reader = stream.try_clone()?;
        if let Some(previous) = self.correlator.attach(LineWriter::new(stream)) {
            close_quietly(previous.into_inner());
        }

        let frame_config = FrameConfig {
            max_line_len: self.config.max_line_len,
        };
        Ok(LinkSession::new(
            LineReader::with_config(reader, frame_config),
            Arc::clone(&self.registry),
            self.correlator.rendezvous(),
            Arc::clone(&self.shutdown),
        ))
    }

    /// Run `session`, and every session after it, until shutdown.
    pub fn run(self, mut session: LinkSession<C::Stream>) {
        let endpoint = self.connector.describe();
        loop {
            let reason = session.run();
            self.close(session);

            if reason == CloseReason::Shutdown || self.shutdown.is_triggered() {
                break;
            }
            info!(%endpoint, ?reason, "link closed, reconnecting");

            session = match self.reconnect(&endpoint) {
                Some(next) => next,
                None => break,
            };
            info!(%endpoint, "link re-established");
        }
        info!(%endpoint, "supervisor stopped");
    }

    fn reconnect(&self, endpoint: &str) -> Option<LinkSession<C::Stream>> {
        loop {
            if self.shutdown.wait_timeout(self.config.reconnect_backoff) {
                return None;
            }
            match self.open() {
                Ok(session) => return Some(session),
                Err(err) => warn!(%endpoint, error = %err, "reconnect failed"),
            }
        }
    }

    fn close(&self, session: LinkSession<C::Stream>) {
        if let Some(writer) = self.correlator.detach() {
            close_quietly(writer.into_inner());
        }
        close_quietly(session.into_inner());
    }
}

fn close_quietly<T: Transport>(mut stream: T) {
    if let Err(err) = stream.close() {
        debug!(error = %err, "error closing transport");
    }
}
