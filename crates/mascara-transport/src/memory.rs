//! In-memory transport over `tokio::io::duplex` pipes.
//!
//! Wires a server and any number of clients together inside one process:
//! each `connect` creates a duplex pipe and hands the far end to the
//! listener. Deterministic and socket-free, which makes it the transport
//! of choice for tests.

use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};

use crate::{ClientFactory, Listener, ServerFactory, TransportError};

/// Buffer size of each direction of a duplex pipe.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Entry point: creates a linked server/connector pair.
pub struct MemoryTransport;

impl MemoryTransport {
    /// Returns a server factory and a connector wired to each other.
    ///
    /// The connector is cheap to clone; every clone reaches the same
    /// listener.
    pub fn pair() -> (MemoryServer, MemoryConnector) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MemoryServer {
                listener: Mutex::new(Some(MemoryListener { incoming: rx })),
            },
            MemoryConnector { tx },
        )
    }
}

/// Server-side factory half of a [`MemoryTransport::pair`].
///
/// `bind` can be called once; the address is ignored.
pub struct MemoryServer {
    listener: Mutex<Option<MemoryListener>>,
}

impl ServerFactory for MemoryServer {
    type Listener = MemoryListener;

    async fn bind(
        &self,
        _addr: &str,
    ) -> Result<MemoryListener, TransportError> {
        self.listener
            .lock()
            .await
            .take()
            .ok_or(TransportError::Closed)
    }
}

/// Accepts the far ends of pipes created by the paired connector.
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
}

impl Listener for MemoryListener {
    type Io = DuplexStream;

    async fn accept(&mut self) -> Result<DuplexStream, TransportError> {
        self.incoming.recv().await.ok_or(TransportError::Closed)
    }

    fn local_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }
}

/// Client-side factory half of a [`MemoryTransport::pair`].
#[derive(Clone)]
pub struct MemoryConnector {
    tx: mpsc::UnboundedSender<DuplexStream>,
}

impl ClientFactory for MemoryConnector {
    type Io = DuplexStream;

    async fn connect(
        &self,
        _addr: &str,
    ) -> Result<DuplexStream, TransportError> {
        let (near, far) = tokio::io::duplex(PIPE_CAPACITY);
        self.tx.send(far).map_err(|_| TransportError::Closed)?;
        Ok(near)
    }
}
