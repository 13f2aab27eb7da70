//! Core message types for Mascara's wire format.
//!
//! The wire speaks a restricted JSON-RPC 2.0 profile: four message kinds,
//! positional `params`/`result` arrays only. These are the structures that
//! get serialized to one-line JSON, framed with `\r\n`, and parsed back on
//! the other side.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON-RPC error code for a request whose method has no handler.
pub const CODE_INVALID_METHOD: i64 = -32601;

/// JSON-RPC error code for a handler that failed or panicked.
pub const CODE_HANDLER_FAILED: i64 = -32000;

/// The `error` member of an error response: `{code, message}`.
///
/// The engine defines a single generic error category; the code is
/// informational and only the message is part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code (JSON-RPC conventions).
    pub code: i64,
    /// Human-readable, single-line error message.
    pub message: String,
}

impl ErrorObject {
    /// Creates an error object with the given code and message.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// One JSON-RPC message.
///
/// `#[serde(untagged)]` classifies an inbound frame by its field shape,
/// tried in declaration order:
///
/// - `{"id", "method", "params"}` → [`Message::Request`]
/// - `{"id", "result"}` → [`Message::Success`]
/// - `{"id", "error"}` → [`Message::Error`] (`id` may be `null`)
/// - `{"method", "params"}` → [`Message::Notification`]
///
/// `Request` must be tried before `Success` and `Notification` because it
/// shares `id` with one and `method`/`params` with the other.
/// `params` and `result` are typed as arrays: an object-shaped `params` is
/// not a valid message and fails decoding, which is what the profile
/// requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// A call that expects exactly one terminal response.
    Request {
        id: String,
        method: String,
        params: Vec<Value>,
    },

    /// Terminal success response; `result` holds positional values.
    Success { id: String, result: Vec<Value> },

    /// Terminal error response. `id` is `null` when the error cannot be
    /// associated with a request.
    Error {
        id: Option<String>,
        error: ErrorObject,
    },

    /// Fire-and-forget message. Carries both user notifications and
    /// stream I/O (the stream-pointer URL is the method name).
    Notification { method: String, params: Vec<Value> },
}

impl Message {
    /// Builds a request frame.
    pub fn request(
        id: impl Into<String>,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        Self::Request {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Builds a success response frame.
    pub fn success(id: impl Into<String>, result: Vec<Value>) -> Self {
        Self::Success {
            id: id.into(),
            result,
        }
    }

    /// Builds an error response frame.
    pub fn error(id: Option<String>, error: ErrorObject) -> Self {
        Self::Error { id, error }
    }

    /// Builds a notification frame.
    pub fn notification(
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        Self::Notification {
            method: method.into(),
            params,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
