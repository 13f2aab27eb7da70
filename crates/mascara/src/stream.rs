//! Stream endpoints, the per-connection stream registry, and the
//! pointer minting/binding logic.
//!
//! Endpoints are object-mode: they carry already-decoded JSON values, not
//! raw bytes. Locally an endpoint is a bounded channel half; on the wire a
//! stream is a sequence of notifications whose `method` is the pointer URL,
//! one value per frame, terminated by a single `null` element.

use std::collections::HashMap;
use std::sync::Arc;

use mascara_protocol::{Message, StreamKind, StreamPointer};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::conn::FrameSender;

/// Errors from stream endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The other end of the endpoint is gone.
    #[error("stream closed")]
    Closed,
}

/// Receiving half of a stream endpoint.
#[derive(Debug)]
pub struct StreamSource {
    rx: mpsc::Receiver<Value>,
}

impl StreamSource {
    /// Next item, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Collects every remaining item until the stream ends.
    pub async fn collect(mut self) -> Vec<Value> {
        let mut items = Vec::new();
        while let Some(item) = self.recv().await {
            items.push(item);
        }
        items
    }
}

/// Sending half of a stream endpoint.
///
/// `null` is the wire's end-of-stream marker: sending a bare JSON `null`
/// terminates the remote end. Applications that need to transmit a real
/// null must wrap it.
#[derive(Debug)]
pub struct StreamSink {
    tx: mpsc::Sender<Value>,
}

impl StreamSink {
    /// Sends one item downstream.
    ///
    /// # Errors
    /// Returns [`StreamError::Closed`] if the consuming side is gone.
    pub async fn send(&self, item: Value) -> Result<(), StreamError> {
        self.tx.send(item).await.map_err(|_| StreamError::Closed)
    }

    /// Ends the stream. Dropping the sink has the same effect.
    pub fn close(self) {}

    pub(crate) fn into_sender(self) -> mpsc::Sender<Value> {
        self.tx
    }
}

/// Creates a connected sink/source pair with the given buffer capacity.
pub fn stream_pair(capacity: usize) -> (StreamSink, StreamSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (StreamSink { tx }, StreamSource { rx })
}

/// One positional slot of a response's `result`.
///
/// Whoever holds a `Source` reads the stream's items; whoever holds a
/// `Sink` feeds it. A server handler hands back a `Source` to stream data
/// to the caller (who resolves a `Source` on its side), or a `Sink` to
/// receive data the caller will produce (who resolves a `Sink`).
#[derive(Debug)]
pub enum RpcValue {
    /// A plain JSON value, passed through verbatim.
    Value(Value),
    /// A live stream producing data for the holder.
    Source(StreamSource),
    /// A live stream accepting data from the holder.
    Sink(StreamSink),
}

impl RpcValue {
    /// Returns the plain value, if this slot is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Unwraps a source slot.
    pub fn into_source(self) -> Option<StreamSource> {
        match self {
            Self::Source(s) => Some(s),
            _ => None,
        }
    }

    /// Unwraps a sink slot.
    pub fn into_sink(self) -> Option<StreamSink> {
        match self {
            Self::Sink(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Value> for RpcValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<StreamSource> for RpcValue {
    fn from(source: StreamSource) -> Self {
        Self::Source(source)
    }
}

impl From<StreamSink> for RpcValue {
    fn from(sink: StreamSink) -> Self {
        Self::Sink(sink)
    }
}

/// Outcome of delivering a stream notification.
pub(crate) enum Delivery {
    /// The pointer was registered; the payload reached its endpoint.
    Delivered,
    /// Unknown pointer; the payload is handed back for observation.
    Unregistered(Vec<Value>),
}

/// Per-connection table of pointer URL → inbound delivery channel.
///
/// Only pointers that expect *inbound* notifications are registered: the
/// feed of a locally bound source, or a server-minted writable endpoint.
/// Delivering the `null` terminator removes the entry; a pointer that has
/// already ended is simply no longer here, so repeated termination is a
/// no-op at the endpoint.
pub(crate) struct StreamRegistry {
    inner: Mutex<HashMap<String, mpsc::Sender<Value>>>,
}

impl StreamRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn insert(&self, pointer: String, tx: mpsc::Sender<Value>) {
        self.inner.lock().await.insert(pointer, tx);
    }

    /// Delivers a stream notification's payload items in order.
    ///
    /// A `null` element ends the stream: the entry is dropped, which
    /// closes the local source, and any items after the `null` are
    /// discarded. Delivery also ends the stream when the local consumer
    /// is gone.
    pub(crate) async fn deliver(
        &self,
        pointer: &str,
        params: Vec<Value>,
    ) -> Delivery {
        let tx = self.inner.lock().await.get(pointer).cloned();
        let Some(tx) = tx else {
            return Delivery::Unregistered(params);
        };
        for item in params {
            if item.is_null() {
                self.remove(pointer).await;
                break;
            }
            if tx.send(item).await.is_err() {
                tracing::debug!(pointer, "stream consumer gone, dropping");
                self.remove(pointer).await;
                break;
            }
        }
        Delivery::Delivered
    }

    async fn remove(&self, pointer: &str) {
        self.inner.lock().await.remove(pointer);
    }

    /// Drops every entry; all locally bound sources end. Used at
    /// connection teardown.
    pub(crate) async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Replaces stream-valued result slots with freshly minted pointers.
///
/// Writable slots (the peer will produce) are registered for inbound
/// delivery right away. Readable slots (we produce) are returned as
/// pending pumps: the caller spawns them only after the response frame
/// carrying the pointers is enqueued, so no data notification can
/// overtake its own pointer on the wire.
pub(crate) async fn mint_result(
    slots: Vec<RpcValue>,
    registry: &Arc<StreamRegistry>,
) -> (Vec<Value>, Vec<(StreamPointer, StreamSource)>) {
    let mut result = Vec::with_capacity(slots.len());
    let mut pumps = Vec::new();
    for slot in slots {
        match slot {
            RpcValue::Value(value) => result.push(value),
            RpcValue::Source(source) => {
                let pointer = StreamPointer::mint(StreamKind::Readable);
                tracing::debug!(%pointer, "minted readable stream");
                result.push(Value::String(pointer.to_string()));
                pumps.push((pointer, source));
            }
            RpcValue::Sink(sink) => {
                let pointer = StreamPointer::mint(StreamKind::Writable);
                tracing::debug!(%pointer, "minted writable stream");
                registry
                    .insert(pointer.to_string(), sink.into_sender())
                    .await;
                result.push(Value::String(pointer.to_string()));
            }
        }
    }
    (result, pumps)
}

/// Rebinds pointer-shaped strings in a received `result` to local mirror
/// endpoints.
///
/// `readable` pointers (the minting peer produces) become sources fed by
/// the registry; `writable` pointers (the minting peer consumes) become
/// sinks whose items are pumped out as notifications.
pub(crate) async fn bind_result(
    result: Vec<Value>,
    registry: &Arc<StreamRegistry>,
    outbound: &FrameSender,
    stream_capacity: usize,
) -> Vec<RpcValue> {
    let mut values = Vec::with_capacity(result.len());
    for value in result {
        let pointer = match &value {
            Value::String(s) => s.parse::<StreamPointer>().ok(),
            _ => None,
        };
        let Some(pointer) = pointer else {
            values.push(RpcValue::Value(value));
            continue;
        };
        tracing::debug!(%pointer, "binding stream pointer");
        match pointer.kind() {
            StreamKind::Readable => {
                let (tx, rx) = mpsc::channel(stream_capacity);
                registry.insert(pointer.to_string(), tx).await;
                values.push(RpcValue::Source(StreamSource { rx }));
            }
            StreamKind::Writable => {
                let (sink, source) = stream_pair(stream_capacity);
                spawn_pump(pointer, source, outbound.clone());
                values.push(RpcValue::Sink(sink));
            }
        }
    }
    values
}

/// Forwards a local source to the peer, one notification per item, then
/// the `null` terminator. One pump task per outbound stream; within a
/// pointer, send order is delivery order.
pub(crate) fn spawn_pump(
    pointer: StreamPointer,
    mut source: StreamSource,
    outbound: FrameSender,
) {
    tokio::spawn(async move {
        let method = pointer.to_string();
        while let Some(item) = source.recv().await {
            let frame = Message::notification(method.clone(), vec![item]);
            if outbound.send(frame).await.is_err() {
                // Connection gone; nothing left to terminate.
                return;
            }
        }
        let end = Message::notification(method, vec![Value::Null]);
        let _ = outbound.send(end).await;
    });
}

// =========================================================================
// Tests
// =========================================================================
