//! Per-connection plumbing shared by the server and client roles.
//!
//! Each connection owns one writer task. Every outbound frame (responses,
//! requests, stream notifications) funnels through its channel, so frame
//! bytes are written whole and the `\r\n` terminator is never split by a
//! concurrent write.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use mascara_protocol::{DecodePolicy, Framer, Message};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection, used for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tuning knobs applied to every connection of a server or client.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of the outbound frame channel; senders wait when full.
    pub outbound_capacity: usize,

    /// Buffer capacity of each stream endpoint.
    pub stream_capacity: usize,

    /// What the deframer does with a complete frame that fails to parse.
    pub decode_policy: DecodePolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            stream_capacity: 64,
            decode_policy: DecodePolicy::default(),
        }
    }
}

/// Sending half of a connection's outbound frame channel.
pub(crate) type FrameSender = mpsc::Sender<Message>;

/// Spawns the writer task owning the connection's write half.
///
/// Runs until the outbound channel closes, the shutdown signal fires
/// (dropped counts), or a write fails. Once it exits, every outstanding
/// [`FrameSender`] starts failing, which unwinds stream pumps and
/// in-flight request tasks.
pub(crate) fn spawn_writer<W>(
    conn_id: ConnectionId,
    mut write_half: W,
    mut outbound: mpsc::Receiver<Message>,
    mut shutdown: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let framer = Framer;
        loop {
            tokio::select! {
                msg = outbound.recv() => {
                    let Some(msg) = msg else { break };
                    let bytes = match framer.frame(&msg) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::warn!(
                                %conn_id, error = %e,
                                "dropping unencodable frame"
                            );
                            continue;
                        }
                    };
                    if let Err(e) = write_half.write_all(&bytes).await {
                        tracing::debug!(
                            %conn_id, error = %e,
                            "write failed, stopping writer"
                        );
                        break;
                    }
                }
                _ = &mut shutdown => break,
            }
        }
        let _ = write_half.shutdown().await;
        tracing::debug!(%conn_id, "writer stopped");
    })
}
