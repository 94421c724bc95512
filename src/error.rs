use thiserror::Error;
use validator::ValidationErrors;

/// Reasons an inbound frame is dropped by the router.
///
/// None of these close the connection; they are logged and the frame is discarded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON document.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// The document has no string `type` field.
    #[error("missing `type` field")]
    MissingType,
    /// The `type` is not registered in the protocol table.
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    /// The body does not match the shape expected for its type.
    #[error("malformed `{kind}` payload: {source}")]
    InvalidBody {
        /// Message type being decoded.
        kind: &'static str,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// The body decoded but failed validation.
    #[error("invalid `{kind}` payload: {source}")]
    Validation {
        /// Message type being validated.
        kind: &'static str,
        /// Validator failure.
        #[source]
        source: ValidationErrors,
    },
}

/// Failure to hand a message to a connection's writer.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Writer channel closed; the transport is gone.
    #[error("connection closed")]
    ConnectionClosed,
    /// The message could not be serialized (a bug, never retried).
    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),
}
