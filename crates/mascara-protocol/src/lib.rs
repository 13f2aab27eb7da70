//! Wire protocol for Mascara.
//!
//! This crate defines what travels on the wire and nothing else:
//!
//! - **Types** ([`Message`], [`ErrorObject`]) — the JSON-RPC 2.0
//!   positional-only message kinds.
//! - **Codec** ([`Framer`], [`Deframer`]) — `\r\n`-delimited single-line
//!   JSON framing, tolerant of frames split across transport chunks.
//! - **Pointers** ([`StreamPointer`], [`StreamKind`]) — the URL-shaped
//!   sentinel strings that name embedded streams.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw bytes) and the
//! engine (dispatch, registries). It knows how to turn bytes into
//! messages and back; it does not know about connections, calls, or
//! endpoints.
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Engine (dispatch)
//! ```

mod codec;
mod error;
mod pointer;
mod types;

pub use codec::{DecodePolicy, Deframer, Framer, FRAME_TERMINATOR};
pub use error::ProtocolError;
pub use pointer::{StreamKind, StreamPointer, POINTER_SCHEME};
pub use types::{
    ErrorObject, Message, CODE_HANDLER_FAILED, CODE_INVALID_METHOD,
};
