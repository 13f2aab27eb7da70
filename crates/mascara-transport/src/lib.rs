//! Transport abstraction layer for Mascara.
//!
//! The engine never opens sockets itself: it is handed a factory and
//! passes listen/connect addresses through verbatim. A connection is any
//! raw bidirectional byte stream (`AsyncRead + AsyncWrite`); framing and
//! message semantics live above this crate.
//!
//! Provided implementations:
//!
//! - [`TcpFactory`] — TCP sockets (default)
//! - [`UnixFactory`] — Unix domain sockets (Unix targets)
//! - [`MemoryTransport`] — in-process duplex pipes, mainly for tests

#![allow(async_fn_in_trait)]

mod error;
mod memory;
mod tcp;
#[cfg(unix)]
mod unix;

pub use error::TransportError;
pub use memory::{MemoryConnector, MemoryListener, MemoryServer, MemoryTransport};
pub use tcp::{TcpAcceptor, TcpFactory};
#[cfg(unix)]
pub use unix::{UnixAcceptor, UnixFactory};

use tokio::io::{AsyncRead, AsyncWrite};

/// A raw duplex byte stream carrying one connection.
///
/// Blanket-implemented for everything that satisfies the bounds; the
/// engine splits it into read and write halves.
pub trait Io: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static> Io for T {}

/// Factory for the server role: turns a listen address into a listener.
pub trait ServerFactory: Send + Sync + 'static {
    /// The listener type produced by this factory.
    type Listener: Listener;

    /// Binds a listener to the given address (interpreted by the
    /// transport, not by the engine).
    async fn bind(&self, addr: &str) -> Result<Self::Listener, TransportError>;
}

/// Accepts incoming connections.
pub trait Listener: Send + 'static {
    /// The connection type produced by this listener.
    type Io: Io;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Io, TransportError>;

    /// The bound local address, if the transport has a meaningful one.
    fn local_addr(&self) -> Option<String>;
}

/// Factory for the client role: turns a remote address into a connection.
pub trait ClientFactory: Send + Sync + 'static {
    /// The connection type produced by this factory.
    type Io: Io;

    /// Connects to the given address.
    async fn connect(&self, addr: &str) -> Result<Self::Io, TransportError>;
}
