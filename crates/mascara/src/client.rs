//! Client role: connect, invoke, and the call registry.
//!
//! A client owns one connection. `invoke` installs a completion in the
//! call registry, writes a request frame, and waits; the reader task
//! correlates terminal responses by id, rebinds any stream pointers in a
//! success result, and completes the pending call. Each id is live from
//! send until its first terminal response, then retired for good.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mascara_protocol::{Deframer, Message, StreamPointer};
use mascara_transport::{ClientFactory, TcpFactory};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::conn::{spawn_writer, ConnectionConfig, ConnectionId, FrameSender};
use crate::stream::{bind_result, Delivery, RpcValue, StreamRegistry};
use crate::MascaraError;

/// Observations the client surfaces instead of acting on.
#[derive(Debug)]
pub enum ClientEvent {
    /// An inbound frame that could not be routed: a response with no
    /// pending call, a notification with no registered pointer, or a
    /// request (this profile's clients serve no methods).
    Unhandled(Message),

    /// The connection failed or violated the protocol; it is gone and
    /// every pending call has been completed with an error.
    ConnectionError(String),
}

type PendingCall = oneshot::Sender<Result<Vec<RpcValue>, MascaraError>>;

/// In-flight calls, plus the closed flag that outlives them.
///
/// `closed` is flipped under the same lock that drains the table, so a
/// call is either drained (and completed with an error) or refused
/// outright; it can never be inserted after teardown and hang.
#[derive(Default)]
struct CallRegistry {
    closed: bool,
    pending: HashMap<String, PendingCall>,
}

type CallMap = Arc<Mutex<CallRegistry>>;

/// A connected RPC client.
pub struct Client {
    conn_id: ConnectionId,
    outbound: FrameSender,
    calls: CallMap,
    streams: Arc<StreamRegistry>,
    next_id: AtomicU64,
    events_rx: Option<mpsc::UnboundedReceiver<ClientEvent>>,
    reader: tokio::task::JoinHandle<()>,
}

impl Client {
    /// Connects over TCP with default configuration.
    pub async fn connect(addr: &str) -> Result<Self, MascaraError> {
        Self::connect_with(TcpFactory, addr, ConnectionConfig::default()).await
    }

    /// Connects through the given transport factory.
    pub async fn connect_with<F: ClientFactory>(
        factory: F,
        addr: &str,
        config: ConnectionConfig,
    ) -> Result<Self, MascaraError> {
        let io = factory.connect(addr).await?;
        let conn_id = ConnectionId::next();
        tracing::info!(%conn_id, addr, "client connected");

        let (read_half, write_half) = tokio::io::split(io);
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        spawn_writer(conn_id, write_half, outbound_rx, shutdown_rx);

        let calls: CallMap = Arc::new(Mutex::new(CallRegistry::default()));
        let streams = Arc::new(StreamRegistry::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(ReaderState {
            conn_id,
            outbound: outbound.clone(),
            calls: Arc::clone(&calls),
            streams: Arc::clone(&streams),
            events: events_tx,
            config: config.clone(),
            read_half,
            shutdown: shutdown_tx,
        }));

        Ok(Self {
            conn_id,
            outbound,
            calls,
            streams,
            next_id: AtomicU64::new(1),
            events_rx: Some(events_rx),
            reader,
        })
    }

    /// This connection's id (log correlation).
    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Calls a remote method and waits for its terminal response.
    ///
    /// Stream pointers in the result are rebound to local endpoints
    /// before the call resolves: a `readable` pointer arrives as
    /// [`RpcValue::Source`], a `writable` one as [`RpcValue::Sink`].
    ///
    /// # Errors
    /// [`MascaraError::Remote`] if the peer answered with an error
    /// response; [`MascaraError::ConnectionClosed`] if the connection
    /// went away first.
    pub async fn invoke(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Vec<RpcValue>, MascaraError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut calls = self.calls.lock().await;
            if calls.closed {
                return Err(MascaraError::ConnectionClosed);
            }
            calls.pending.insert(id.clone(), tx);
        }

        let request = Message::request(id.clone(), method, params);
        if self.outbound.send(request).await.is_err() {
            self.calls.lock().await.pending.remove(&id);
            return Err(MascaraError::ConnectionClosed);
        }
        rx.await.map_err(|_| MascaraError::ConnectionClosed)?
    }

    /// Sends a fire-and-forget notification.
    pub async fn notify(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<(), MascaraError> {
        self.outbound
            .send(Message::notification(method, params))
            .await
            .map_err(|_| MascaraError::ConnectionClosed)
    }

    /// Takes the receiver for stray-frame and connection-error
    /// observations. Returns `None` on the second call.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.events_rx.take()
    }

    /// Closes the connection, failing every pending call and ending every
    /// bound endpoint.
    pub async fn close(&self) {
        self.reader.abort();
        fail_pending(&self.calls).await;
        self.streams.clear().await;
        tracing::debug!(conn_id = %self.conn_id, "client closed");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Aborting the reader drops the writer's shutdown handle, which
        // stops the writer in turn.
        self.reader.abort();
    }
}

struct ReaderState<R> {
    conn_id: ConnectionId,
    outbound: FrameSender,
    calls: CallMap,
    streams: Arc<StreamRegistry>,
    events: mpsc::UnboundedSender<ClientEvent>,
    config: ConnectionConfig,
    read_half: R,
    shutdown: oneshot::Sender<()>,
}

async fn read_loop<R>(mut state: ReaderState<R>)
where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
{
    let conn_id = state.conn_id;
    let mut deframer = Deframer::new(state.config.decode_policy);
    let mut buf = vec![0u8; 8 * 1024];

    loop {
        match state.read_half.read(&mut buf).await {
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
                        let _ = state.events.send(
                            ClientEvent::ConnectionError(e.to_string()),
                        );
                        break;
                    }
                };
                for message in messages {
                    dispatch(&state, message).await;
                }
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "read failed");
                let _ = state
                    .events
                    .send(ClientEvent::ConnectionError(e.to_string()));
                break;
            }
        }
    }

    // Teardown: fail pending calls, end endpoints, stop the writer.
    fail_pending(&state.calls).await;
    state.streams.clear().await;
    drop(state.shutdown);
}

/// Routes one decoded frame.
async fn dispatch<R>(state: &ReaderState<R>, message: Message) {
    match message {
        Message::Success { id, result } => {
            let pending = state.calls.lock().await.pending.remove(&id);
            match pending {
                Some(completion) => {
                    let values = bind_result(
                        result,
                        &state.streams,
                        &state.outbound,
                        state.config.stream_capacity,
                    )
                    .await;
                    let _ = completion.send(Ok(values));
                }
                // Unknown or already-retired id; duplicates land here too.
                None => unhandled(state, Message::Success { id, result }),
            }
        }

        Message::Error { id, error } => {
            let pending = match &id {
                Some(id) => state.calls.lock().await.pending.remove(id),
                None => None,
            };
            match pending {
                Some(completion) => {
                    let _ = completion.send(Err(MascaraError::Remote(error)));
                }
                None => unhandled(state, Message::Error { id, error }),
            }
        }

        Message::Notification { method, params } => {
            if method.parse::<StreamPointer>().is_ok() {
                match state.streams.deliver(&method, params).await {
                    // Stream dispatch is terminal for the message.
                    Delivery::Delivered => {}
                    Delivery::Unregistered(params) => {
                        unhandled(
                            state,
                            Message::Notification { method, params },
                        );
                    }
                }
            } else {
                unhandled(state, Message::Notification { method, params });
            }
        }

        // Clients in this profile serve no methods.
        request @ Message::Request { .. } => unhandled(state, request),
    }
}

fn unhandled<R>(state: &ReaderState<R>, message: Message) {
    tracing::debug!(conn_id = %state.conn_id, ?message, "unhandled frame");
    let _ = state.events.send(ClientEvent::Unhandled(message));
}

async fn fail_pending(calls: &CallMap) {
    let mut calls = calls.lock().await;
    calls.closed = true;
    for (_, completion) in calls.pending.drain() {
        let _ = completion.send(Err(MascaraError::ConnectionClosed));
    }
}
