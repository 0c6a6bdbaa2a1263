//! Listener server and the single-listener slot it feeds

use super::{BroadcastMessage, BroadcastSink, SinkDeliveryError};
use crate::telemetry::{increment, set_gauge, CounterMetric, GaugeMetric};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

/// Listener server errors
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct ListenerHandle {
    id: u64,
    peer: SocketAddr,
    tx: mpsc::Sender<String>,
}

/// The one active listener, shared between the accept task and the loop
///
/// The lock is only held for a non-blocking hand-off. Replacing the handle
/// drops the previous sender, which closes that connection.
#[derive(Default)]
pub struct ListenerSlot {
    current: Mutex<Option<ListenerHandle>>,
    next_id: AtomicU64,
}

impl ListenerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a listener, replacing the previous one; returns its id
    pub fn attach(&self, peer: SocketAddr, tx: mpsc::Sender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .current
            .lock()
            .replace(ListenerHandle { id, peer, tx });
        if let Some(previous) = replaced {
            tracing::info!(previous = %previous.peer, %peer, "Replacing listener");
        } else {
            tracing::info!(%peer, "Listener attached");
        }
        set_gauge(GaugeMetric::ListenerAttached, 1.0);
        id
    }

    /// Remove listener `id` if it is still the active one
    pub fn detach(&self, id: u64) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|h| h.id == id) {
            *current = None;
            set_gauge(GaugeMetric::ListenerAttached, 0.0);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Address of the active listener
    pub fn peer(&self) -> Option<SocketAddr> {
        self.current.lock().as_ref().map(|h| h.peer)
    }
}

#[async_trait]
impl BroadcastSink for ListenerSlot {
    /// Hand a message to the active listener; a no-op when none is attached
    async fn send(&self, message: &BroadcastMessage) -> Result<(), SinkDeliveryError> {
        let text = message.to_json()?;
        let mut current = self.current.lock();
        let Some(handle) = current.as_ref() else {
            return Ok(());
        };

        match handle.tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkDeliveryError::Backpressure),
            Err(TrySendError::Closed(_)) => {
                tracing::info!(peer = %handle.peer, "Listener gone, removing");
                *current = None;
                set_gauge(GaugeMetric::ListenerAttached, 0.0);
                Err(SinkDeliveryError::Closed)
            }
        }
    }
}

/// Accepts listener connections and installs each into the slot
pub struct ListenerServer {
    listener: TcpListener,
    slot: Arc<ListenerSlot>,
    buffer: usize,
}

impl ListenerServer {
    pub async fn bind(
        addr: &str,
        slot: Arc<ListenerSlot>,
        buffer: usize,
    ) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            slot,
            buffer: buffer.max(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ListenerError> {
        tracing::info!(addr = %self.local_addr()?, "Listener server started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            increment(CounterMetric::ListenersAccepted);
                            tokio::spawn(serve_listener(
                                stream,
                                peer,
                                self.slot.clone(),
                                self.buffer,
                                shutdown.clone(),
                            ));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept listener");
                        }
                    }
                }
            }
        }

        tracing::info!("Listener server stopped");
        Ok(())
    }
}

async fn serve_listener(
    stream: TcpStream,
    peer: SocketAddr,
    slot: Arc<ListenerSlot>,
    buffer: usize,
    shutdown: CancellationToken,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    let greeting = match BroadcastMessage::welcome().to_json() {
        Ok(greeting) => greeting,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode greeting");
            return;
        }
    };
    if let Err(e) = write.send(Message::Text(greeting)).await {
        tracing::debug!(%peer, error = %e, "Listener left before greeting");
        return;
    }

    let (tx, mut rx) = mpsc::channel(buffer);
    let id = slot.attach(peer, tx);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            outgoing = rx.recv() => {
                match outgoing {
                    Some(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::debug!(%peer, error = %e, "Listener write failed");
                            break;
                        }
                    }
                    None => {
                        // Replaced by a newer listener
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Listeners are receive-only
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    slot.detach(id);
    tracing::info!(%peer, "Listener disconnected");
}
