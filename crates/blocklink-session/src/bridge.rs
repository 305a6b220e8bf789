use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use blocklink_frame::{DeviceRecord, Envelope, Payload, DEFAULT_MAX_LINE_LEN};
use blocklink_transport::{Connector, Transport, TransportError};
use tracing::{info, warn};

use crate::correlator::WriteCorrelator;
use crate::error::{LinkError, Result};
use crate::registry::{Listener, ListenerRegistry};
use crate::shutdown::ShutdownSignal;
use crate::supervisor::Supervisor;

/// Device code of the firmware version query.
pub const VERSION_COMMAND: i64 = 1003;
/// Payload of the firmware version query.
pub const VERSION_QUERY: &str = "VNO";

/// Bridge behavior configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How long a write waits for its acknowledgement. Default: 2 s.
    pub ack_timeout: Duration,
    /// Pause between losing the link and reopening it. Default: 1 s.
    pub reconnect_backoff: Duration,
    /// Maximum accepted line length in bytes.
    pub max_line_len: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            reconnect_backoff: Duration::from_secs(1),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

/// Handle to a running bridge.
///
/// Owns the background supervisor thread that reads from the microcontroller
/// and reconnects when the link drops. All methods take `&self`, so a bridge
/// can be shared between threads behind an `Arc`. Dropping the bridge shuts
/// it down.
pub struct Bridge<C: Connector> {
    correlator: Arc<WriteCorrelator<C::Stream>>,
    registry: Arc<ListenerRegistry>,
    shutdown: Arc<ShutdownSignal>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    endpoint: String,
}

impl<C: Connector> Bridge<C> {
    /// Open the transport and start the bridge.
    ///
    /// Failing to open the transport here is fatal and returned to the
    /// caller. Once connected, later link failures are recovered in the
    /// background.
    pub fn connect(connector: C, config: BridgeConfig, listeners: Vec<Listener>) -> Result<Self> {
        let endpoint = connector.describe();
        let registry = Arc::new(ListenerRegistry::with_listeners(listeners));
        let correlator = Arc::new(WriteCorrelator::new(config.ack_timeout));
        let shutdown = Arc::new(ShutdownSignal::new());

        let supervisor = Supervisor::new(
            connector,
            Arc::clone(&correlator),
            Arc::clone(&registry),
            Arc::clone(&shutdown),
            config,
        );
        let session = supervisor.open()?;

        let handle = thread::Builder::new()
            .name("blocklink-supervisor".to_string())
            .spawn(move || supervisor.run(session))
            .map_err(TransportError::Io)?;

        info!(%endpoint, "bridge connected");
        Ok(Self {
            correlator,
            registry,
            shutdown,
            supervisor: Mutex::new(Some(handle)),
            endpoint,
        })
    }

    /// Send `envelope` and wait for the microcontroller's acknowledgement.
    ///
    /// Only one write is outstanding at a time; concurrent callers wait their
    /// turn. Returns the acknowledgement records, or [`LinkError::Timeout`].
    pub fn write(&self, envelope: &Envelope) -> Result<Vec<DeviceRecord>> {
        if self.shutdown.is_triggered() {
            return Err(LinkError::Shutdown);
        }
        self.correlator.write(envelope)
    }

    /// Send device records and wait for them to be acknowledged.
    pub fn write_device_data(&self, records: Vec<DeviceRecord>) -> Result<()> {
        self.write(&Envelope::device_data(records)).map(|_| ())
    }

    /// Ask the microcontroller for its firmware version.
    pub fn get_version(&self) -> Result<String> {
        let query = DeviceRecord::new("0", 0, VERSION_COMMAND, Some(VERSION_QUERY.into()));
        let ack = self.write(&Envelope::device_data(vec![query]))?;

        let first = ack
            .first()
            .ok_or_else(|| LinkError::UnexpectedAck("empty acknowledgement".to_string()))?;
        match &first.data {
            Some(Payload::Text(version)) => Ok(version.clone()),
            other => Err(LinkError::UnexpectedAck(format!(
                "version payload is {other:?}"
            ))),
        }
    }

    /// Register a listener for every device record observed from now on.
    pub fn on_device_data<F>(&self, listener: F)
    where
        F: Fn(DeviceRecord) + Send + Sync + 'static,
    {
        self.registry.register(listener);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether a transport is currently attached.
    ///
    /// `false` during the gap between losing the link and reopening it.
    pub fn is_connected(&self) -> bool {
        self.correlator.is_attached()
    }

    /// Description of the endpoint this bridge talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop the supervisor and close the transport. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.trigger();

        // Closing the write half wakes a reader blocked on the same stream.
        if let Some(writer) = self.correlator.detach() {
            let mut stream = writer.into_inner();
            if let Err(err) = stream.close() {
                warn!(error = %err, "error closing transport");
            }
        }

        let handle = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(endpoint = %self.endpoint, "supervisor thread panicked");
            }
            info!(endpoint = %self.endpoint, "bridge shut down");
        }
    }
}

impl<C: Connector> Drop for Bridge<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C: Connector> std::fmt::Debug for Bridge<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.is_connected())
            .field("listeners", &self.registry.len())
            .finish()
    }
}
