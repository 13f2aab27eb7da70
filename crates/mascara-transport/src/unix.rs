//! Unix domain socket transport implementation.

use tokio::net::{UnixListener, UnixStream};

use crate::{ClientFactory, Listener, ServerFactory, TransportError};

/// A [`ServerFactory`] / [`ClientFactory`] over Unix domain sockets.
///
/// Addresses are filesystem paths. Binding fails if the path already
/// exists; callers own cleanup of stale socket files.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixFactory;

impl ServerFactory for UnixFactory {
    type Listener = UnixAcceptor;

    async fn bind(&self, addr: &str) -> Result<UnixAcceptor, TransportError> {
        let listener = UnixListener::bind(addr).map_err(TransportError::Bind)?;
        tracing::info!(path = addr, "unix transport listening");
        Ok(UnixAcceptor { listener })
    }
}

impl ClientFactory for UnixFactory {
    type Io = UnixStream;

    async fn connect(&self, addr: &str) -> Result<UnixStream, TransportError> {
        let stream = UnixStream::connect(addr)
            .await
            .map_err(TransportError::Connect)?;
        tracing::debug!(path = addr, "unix connection established");
        Ok(stream)
    }
}

/// A bound Unix socket listener.
pub struct UnixAcceptor {
    listener: UnixListener,
}

impl Listener for UnixAcceptor {
    type Io = UnixStream;

    async fn accept(&mut self) -> Result<UnixStream, TransportError> {
        let (stream, _peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        tracing::debug!("accepted unix connection");
        Ok(stream)
    }

    fn local_addr(&self) -> Option<String> {
        self.listener
            .local_addr()
            .ok()
            .and_then(|a| a.as_pathname().map(|p| p.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bind_connect_and_exchange_bytes() {
        let path = std::env::temp_dir().join(format!(
            "mascara-unix-test-{}.sock",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let addr = path.display().to_string();

        let mut acceptor = UnixFactory.bind(&addr).await.unwrap();

        let connect_addr = addr.clone();
        let client = tokio::spawn(async move {
            let mut io = UnixFactory.connect(&connect_addr).await.unwrap();
            io.write_all(b"hello").await.unwrap();
        });

        let mut server_io = acceptor.accept().await.unwrap();
        let mut buf = [0u8; 5];
        server_io.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        client.await.unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
