//! Server role: accept loop and per-connection dispatcher.
//!
//! Each accepted connection gets its own task. Inbound frames are decoded
//! and dispatched in arrival order; each request runs its handler on a
//! spawned task (responses are correlated by id, so slow calls don't stall
//! the loop), and stream notifications are delivered through the
//! connection's stream registry.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use mascara_protocol::{
    Deframer, ErrorObject, Message, StreamPointer, CODE_HANDLER_FAILED,
    CODE_INVALID_METHOD,
};
use mascara_transport::{Io, Listener, ServerFactory, TcpFactory, TransportError};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};

use crate::conn::{spawn_writer, ConnectionConfig, ConnectionId, FrameSender};
use crate::handler::HandlerTable;
use crate::stream::{mint_result, spawn_pump, Delivery, StreamRegistry};
use crate::MascaraError;

/// A frame the server observed but could not route: a response (this
/// profile's servers issue no requests) or a notification with no
/// registered stream pointer.
#[derive(Debug)]
pub struct ServerEvent {
    /// Connection the frame arrived on.
    pub conn_id: ConnectionId,
    /// The unroutable frame.
    pub message: Message,
}

/// An RPC server: a handler table plus an injected transport factory.
pub struct Server<F = TcpFactory> {
    handlers: HandlerTable,
    factory: F,
    config: ConnectionConfig,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<ServerEvent>>,
}

impl Server<TcpFactory> {
    /// Creates a server over TCP with default configuration.
    pub fn new(handlers: HandlerTable) -> Self {
        Self::with_factory(handlers, TcpFactory)
    }
}

impl<F: ServerFactory> Server<F> {
    /// Creates a server over the given transport factory.
    pub fn with_factory(handlers: HandlerTable, factory: F) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            handlers,
            factory,
            config: ConnectionConfig::default(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Replaces the per-connection configuration.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Takes the receiver for unroutable-frame observations.
    ///
    /// Take it before [`listen`](Self::listen); afterwards the events are
    /// only logged. Returns `None` on the second call.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        self.events_rx.take()
    }

    /// Binds the listener. The address is handed to the factory verbatim.
    pub async fn listen(
        self,
        addr: &str,
    ) -> Result<ListeningServer<F::Listener>, MascaraError> {
        let listener = self.factory.bind(addr).await?;
        tracing::info!(addr, "mascara server listening");
        Ok(ListeningServer {
            listener,
            shared: Arc::new(Shared {
                handlers: self.handlers,
                config: self.config,
                events: self.events_tx,
            }),
        })
    }
}

/// State shared by every connection of one server.
struct Shared {
    handlers: HandlerTable,
    config: ConnectionConfig,
    events: mpsc::UnboundedSender<ServerEvent>,
}

/// A bound server. Call [`run`](Self::run) to start accepting.
pub struct ListeningServer<L: Listener> {
    listener: L,
    shared: Arc<Shared>,
}

impl<L: Listener> ListeningServer<L> {
    /// The bound local address, if the transport reports one.
    pub fn local_addr(&self) -> Option<String> {
        self.listener.local_addr()
    }

    /// Runs the accept loop, spawning one task per connection.
    ///
    /// Returns cleanly when the transport reports it is closed; other
    /// accept errors are logged and the loop continues.
    pub async fn run(mut self) -> Result<(), MascaraError> {
        loop {
            match self.listener.accept().await {
                Ok(io) => {
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(handle_connection(io, shared));
                }
                Err(TransportError::Closed) => {
                    tracing::info!("listener closed");
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Serves one connection from accept to close.
async fn handle_connection<T: Io>(io: T, shared: Arc<Shared>) {
    let conn_id = ConnectionId::next();
    tracing::debug!(%conn_id, "handling new connection");

    let (mut read_half, write_half) = tokio::io::split(io);
    let (outbound, outbound_rx) =
        mpsc::channel(shared.config.outbound_capacity);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    spawn_writer(conn_id, write_half, outbound_rx, shutdown_rx);

    let streams = Arc::new(StreamRegistry::new());
    let mut deframer = Deframer::new(shared.config.decode_policy);
    let mut buf = vec![0u8; 8 * 1024];

    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!(%conn_id, "connection closed by peer");
                break;
            }
            Ok(n) => {
                let messages = match deframer.push(&buf[..n]) {
                    Ok(messages) => messages,
                    Err(e) => {
                        tracing::warn!(
                            %conn_id, error = %e,
                            "protocol violation, closing connection"
                        );
                        break;
                    }
                };
                for message in messages {
                    dispatch(conn_id, message, &outbound, &streams, &shared)
                        .await;
                }
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "read failed");
                break;
            }
        }
    }

    // Teardown: end every inbound endpoint, then stop the writer.
    streams.clear().await;
    drop(shutdown_tx);
    tracing::debug!(%conn_id, "connection finished");
}

/// Routes one decoded frame.
async fn dispatch(
    conn_id: ConnectionId,
    message: Message,
    outbound: &FrameSender,
    streams: &Arc<StreamRegistry>,
    shared: &Arc<Shared>,
) {
    match message {
        Message::Request { id, method, params } => {
            let Some(handler) = shared.handlers.get(&method) else {
                tracing::debug!(%conn_id, method, "unknown method");
                let error = ErrorObject::new(
                    CODE_INVALID_METHOD,
                    format!("Invalid method: {method}"),
                );
                let _ = outbound.send(Message::error(Some(id), error)).await;
                return;
            };
            let outbound = outbound.clone();
            let streams = Arc::clone(streams);
            tokio::spawn(run_handler(id, handler, params, outbound, streams));
        }

        Message::Notification { method, params } => {
            if method.parse::<StreamPointer>().is_ok() {
                match streams.deliver(&method, params).await {
                    // Stream dispatch is terminal for the message.
                    Delivery::Delivered => {}
                    Delivery::Unregistered(params) => {
                        unhandled(
                            shared,
                            conn_id,
                            Message::Notification { method, params },
                        );
                    }
                }
            } else {
                unhandled(shared, conn_id, Message::Notification { method, params });
            }
        }

        // This profile's servers issue no outbound requests, so inbound
        // responses have nothing to correlate with.
        response @ (Message::Success { .. } | Message::Error { .. }) => {
            unhandled(shared, conn_id, response);
        }
    }
}

/// Runs one handler invocation and sends its terminal response.
async fn run_handler(
    id: String,
    handler: Arc<dyn crate::handler::Handler>,
    params: Vec<serde_json::Value>,
    outbound: FrameSender,
    streams: Arc<StreamRegistry>,
) {
    // The async wrapper defers `call` to the first poll, so a handler
    // that panics before returning its future is caught as well.
    let outcome = AssertUnwindSafe(async move { handler.call(params).await })
        .catch_unwind()
        .await;

    let response = match outcome {
        Ok(Ok(slots)) => {
            let (result, pumps) = mint_result(slots, &streams).await;
            // The response carrying the pointers must be enqueued before
            // any of their data notifications.
            if outbound.send(Message::success(id, result)).await.is_err() {
                return;
            }
            for (pointer, source) in pumps {
                spawn_pump(pointer, source, outbound.clone());
            }
            return;
        }
        Ok(Err(e)) => Message::error(
            Some(id),
            ErrorObject::new(CODE_HANDLER_FAILED, e.message()),
        ),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            tracing::warn!(message = %message, "handler panicked");
            Message::error(
                Some(id),
                ErrorObject::new(CODE_HANDLER_FAILED, message),
            )
        }
    };
    let _ = outbound.send(response).await;
}

fn unhandled(shared: &Arc<Shared>, conn_id: ConnectionId, message: Message) {
    tracing::debug!(%conn_id, ?message, "unhandled frame");
    let _ = shared.events.send(ServerEvent { conn_id, message });
}
