//! # Mascara
//!
//! Bidirectional RPC with live streams embedded in the control channel.
//!
//! One duplex transport carries JSON-RPC request/response framing *and*
//! the data streams referenced by responses. When a handler returns a
//! stream, the response carries a URL-shaped *stream pointer* in its
//! place; the receiving side rebinds the pointer to a local endpoint
//! whose I/O rides on subsequent notifications addressed by that URL.
//!
//! ```text
//! transport bytes → Deframer → Dispatcher → handlers / pending calls
//!                                  ↕
//!                           Stream Registry
//!                                  ↕
//! transport bytes ← Framer ← outbound queue ← responses / stream pumps
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mascara::prelude::*;
//! use serde_json::{json, Value};
//!
//! # async fn demo() -> Result<(), MascaraError> {
//! let mut handlers = HandlerTable::new();
//! handlers.register("echo", |params: Vec<Value>| async move {
//!     Ok(params.into_iter().map(RpcValue::Value).collect())
//! });
//!
//! let server = Server::new(handlers).listen("127.0.0.1:4000").await?;
//! tokio::spawn(server.run());
//!
//! let client = Client::connect("127.0.0.1:4000").await?;
//! let reply = client.invoke("echo", vec![json!("hi")]).await?;
//! assert_eq!(reply[0].as_value(), Some(&json!("hi")));
//! # Ok(())
//! # }
//! ```

mod client;
mod conn;
mod error;
mod handler;
mod server;
mod stream;

pub use client::{Client, ClientEvent};
pub use conn::{ConnectionConfig, ConnectionId};
pub use error::MascaraError;
pub use handler::{Handler, HandlerError, HandlerResult, HandlerTable};
pub use server::{ListeningServer, Server, ServerEvent};
pub use stream::{
    stream_pair, RpcValue, StreamError, StreamSink, StreamSource,
};

/// Re-exports everything needed to run a server or client.
///
/// ```rust
/// use mascara::prelude::*;
/// ```
pub mod prelude {
    // Engine
    pub use crate::{
        Client, ClientEvent, ConnectionConfig, ConnectionId, Handler,
        HandlerError, HandlerResult, HandlerTable, ListeningServer,
        MascaraError, RpcValue, Server, ServerEvent, StreamError,
        StreamSink, StreamSource,
    };
    pub use crate::stream_pair;

    // Protocol types
    pub use mascara_protocol::{
        DecodePolicy, ErrorObject, Message, StreamKind, StreamPointer,
    };

    // Transport factories
    pub use mascara_transport::{
        ClientFactory, Listener, MemoryConnector, MemoryServer,
        MemoryTransport, ServerFactory, TcpFactory, TransportError,
    };
    #[cfg(unix)]
    pub use mascara_transport::UnixFactory;
}
