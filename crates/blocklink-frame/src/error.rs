/// Errors that can occur while reading, decoding or writing envelope lines.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The line is not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// The envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(serde_json::Error),

    /// The line exceeds the configured maximum length.
    #[error("line too long (more than {max} bytes)")]
    LineTooLong { max: usize },

    /// An I/O error occurred while reading or writing lines.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached end-of-stream.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
