/// Errors that can occur in bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] blocklink_transport::TransportError),

    /// No acknowledgement arrived in time.
    #[error("write timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The acknowledgement does not have the expected shape.
    #[error("unexpected acknowledgement: {0}")]
    UnexpectedAck(String),

    /// The bridge has been shut down.
    #[error("bridge shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, LinkError>;
