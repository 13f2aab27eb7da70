//! Error types for the protocol layer.

/// Errors that can occur while encoding, framing, or parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization of an outbound message failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// A complete inbound frame failed to parse as a JSON-RPC message.
    ///
    /// Only raised under [`DecodePolicy::Strict`](crate::DecodePolicy);
    /// fatal to the connection.
    #[error("bad frame: {0}")]
    BadFrame(String),

    /// A string did not match the stream-pointer URL grammar.
    #[error("invalid stream pointer: {0}")]
    InvalidPointer(String),
}
