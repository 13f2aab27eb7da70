//! TCP transport implementation using `tokio::net`.

use tokio::net::{TcpListener, TcpStream};

use crate::{ClientFactory, Listener, ServerFactory, TransportError};

/// A [`ServerFactory`] / [`ClientFactory`] over TCP sockets.
///
/// Addresses are whatever `tokio::net` accepts (`"127.0.0.1:0"`,
/// `"host:port"`, …); the engine passes them through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpFactory;

impl ServerFactory for TcpFactory {
    type Listener = TcpAcceptor;

    async fn bind(&self, addr: &str) -> Result<TcpAcceptor, TransportError> {
        let listener =
            TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        tracing::info!(addr, "tcp transport listening");
        Ok(TcpAcceptor { listener })
    }
}

impl ClientFactory for TcpFactory {
    type Io = TcpStream;

    async fn connect(&self, addr: &str) -> Result<TcpStream, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::Connect)?;
        tracing::debug!(addr, "tcp connection established");
        Ok(stream)
    }
}

/// A bound TCP listener.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl Listener for TcpAcceptor {
    type Io = TcpStream;

    async fn accept(&mut self) -> Result<TcpStream, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        tracing::debug!(%peer, "accepted tcp connection");
        Ok(stream)
    }

    fn local_addr(&self) -> Option<String> {
        self.listener.local_addr().ok().map(|a| a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bind_connect_and_exchange_bytes() {
        let mut acceptor = TcpFactory.bind("127.0.0.1:0").await.unwrap();
        let addr = acceptor.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut io = TcpFactory.connect(&addr).await.unwrap();
            io.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            io.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut server_io = acceptor.accept().await.unwrap();
        let mut buf = [0u8; 4];
        server_io.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        server_io.write_all(b"pong").await.unwrap();

        assert_eq!(&client.await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is essentially never listening.
        let result = TcpFactory.connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }
}
