//! Unified error type for the Mascara engine.

use mascara_protocol::{ErrorObject, ProtocolError};
use mascara_transport::TransportError;

/// Top-level error that wraps the layer-specific errors.
///
/// The `#[from]` attributes let `?` convert sub-crate errors
/// automatically, so engine code deals with one type.
#[derive(Debug, thiserror::Error)]
pub enum MascaraError {
    /// A transport-level error (bind, accept, connect, I/O).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, frame decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The peer answered a call with an error response.
    #[error("remote error: {0}")]
    Remote(ErrorObject),

    /// The connection closed while the operation was in flight.
    #[error("connection closed")]
    ConnectionClosed,
}

impl MascaraError {
    /// The remote error object, when the peer rejected a call.
    pub fn as_remote(&self) -> Option<&ErrorObject> {
        match self {
            Self::Remote(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: MascaraError = TransportError::Closed.into();
        assert!(matches!(err, MascaraError::Transport(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: MascaraError = ProtocolError::BadFrame("nope".into()).into();
        assert!(matches!(err, MascaraError::Protocol(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_remote_error_carries_message() {
        let err = MascaraError::Remote(ErrorObject::new(-32000, "boom"));
        assert!(err.to_string().contains("boom"));
        assert_eq!(err.as_remote().unwrap().code, -32000);
    }
}
