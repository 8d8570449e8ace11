//! Error types for the Flight bridge.

/// Errors raised while bridging the data service to HTTP.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    // Connection Errors
    /// The data service could not be reached
    #[error("Connection to {address} failed: {reason}")]
    Connection { address: String, reason: String },

    /// Configured location is not a usable host:port
    #[error("Invalid location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    // Resolution Errors
    /// Descriptor resolved to a FlightInfo without endpoints
    #[error("No endpoints found")]
    NoEndpoints,

    /// First endpoint carries no ticket
    #[error("Endpoint has no ticket")]
    MissingTicket,

    // Stream Errors
    /// Upstream RPC failed (before or during streaming)
    #[error("Upstream error: {0}")]
    Upstream(#[from] tonic::Status),

    /// Upstream call was cancelled by the consumer
    #[error("Upstream call cancelled")]
    Cancelled,

    // Decode Errors
    /// Reply bytes could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Arrow IPC decoding failed
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Segment too large for a 32-bit length prefix
    #[error("Segment of {len} bytes exceeds the IPC length prefix")]
    SegmentTooLarge { len: usize },

    // Template Errors
    /// No template stored under this slug
    #[error("Template not found: {slug}")]
    TemplateNotFound { slug: String },

    /// Template name or slug is unusable
    #[error("Invalid template: {message}")]
    InvalidTemplate { message: String },

    // Local Executor Errors
    /// No local executor program configured
    #[error("Local executor is not configured")]
    LocalExecutorDisabled,

    /// Local executor process failed
    #[error("Local executor failed: {message}")]
    LocalProcess { message: String },

    /// Filesystem or process I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn decode(message: impl Into<String>) -> Self {
        BridgeError::Decode {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::decode(e.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
