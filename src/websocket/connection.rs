//! WebSocket Connection
//!
//! One peer's duplex stream plus its private outbound queue.
//!
//! The queue decouples producers (the hub's broadcasts and this
//! connection's own request handlers) from socket I/O: producers never wait,
//! and a full queue drops the message instead of stalling them.
//!
//! Two activities run per connection:
//! - [`Connection::read_loop`]: reads frames under an idle deadline and
//!   answers requests through the data provider
//! - [`Connection::write_loop`]: drains the queue to the socket, coalescing
//!   whatever is already queued into one frame, and pings on a timer

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use uuid::Uuid;

use super::messages::{ClientMessage, ServerMessage};
use crate::provider::DataProvider;

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// A single peer connection
pub struct Connection {
    id: ConnectionId,
    state: Mutex<ConnectionState>,
    /// Flips to `true` once on close; the read loop watches it
    closed_tx: watch::Sender<bool>,
    capacity: usize,
}

struct ConnectionState {
    outbound: Option<mpsc::Sender<String>>,
    closed: bool,
}

/// Timing for the per-connection activities
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTimings {
    /// Idle read deadline, reset by every inbound frame
    pub pong_wait: Duration,
    /// Keep-alive ping period
    pub ping_period: Duration,
    /// Deadline for one socket write
    pub write_wait: Duration,
}

/// Why a message was not queued
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("Outbound queue is full")]
    Full,

    #[error("Connection is closed")]
    Closed,

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

/// Why a socket activity stopped
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Peer idle for more than {0:?}")]
    IdleTimeout(Duration),

    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] axum::Error),
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (closed_tx, _) = watch::channel(false);

        let conn = Self {
            id: Uuid::new_v4().to_string(),
            state: Mutex::new(ConnectionState {
                outbound: Some(tx),
                closed: false,
            }),
            closed_tx,
            capacity,
        };

        (Arc::new(conn), rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a serialized message without waiting
    ///
    /// A full queue drops the message; the caller is never blocked.
    pub fn enqueue(&self, payload: String) -> Result<(), EnqueueError> {
        let state = self.state();
        let Some(tx) = state.outbound.as_ref() else {
            return Err(EnqueueError::Closed);
        };

        match tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    connection_id = %self.id,
                    capacity = self.capacity,
                    "Outbound queue full, dropping message"
                );
                Err(EnqueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Serialize and queue a message
    pub fn send(&self, message: &ServerMessage) -> Result<(), EnqueueError> {
        let payload = message.to_json().map_err(|e| {
            tracing::error!(error = %e, kind = message.kind(), "Failed to serialize message");
            EnqueueError::Encode(e.to_string())
        })?;
        self.enqueue(payload)
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Close the queue and signal both activities to stop
    ///
    /// Returns `false` if the connection was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state();
        if state.closed {
            return false;
        }

        state.closed = true;
        // Dropping the only sender ends the write loop once the queue drains
        state.outbound = None;
        self.closed_tx.send_replace(true);

        tracing::debug!(connection_id = %self.id, "Connection closed");
        true
    }

    /// Answer one client request through the data provider
    ///
    /// Provider failures become an `error` envelope; the connection stays open.
    async fn handle_request(&self, provider: &dyn DataProvider, request: ClientMessage) {
        if let Some(response) = self.respond(provider, request).await {
            let _ = self.send(&response);
        }
    }

    /// Build the reply to a request without queueing it
    ///
    /// `None` for requests that get no reply.
    pub async fn respond(
        &self,
        provider: &dyn DataProvider,
        request: ClientMessage,
    ) -> Option<ServerMessage> {
        let (result, failure) = match request {
            ClientMessage::RequestSnapshot => (
                provider
                    .fetch_snapshot()
                    .await
                    .map(ServerMessage::DashboardUpdate),
                "Error al obtener datos del dashboard",
            ),
            ClientMessage::RequestSectionBreakdown => (
                provider
                    .fetch_section_breakdown()
                    .await
                    .map(ServerMessage::SectionBreakdown),
                "Error al obtener espacios por sección",
            ),
            ClientMessage::RequestAvailableSpaces => (
                provider
                    .fetch_available_spaces()
                    .await
                    .map(ServerMessage::AvailableSpaces),
                "Error al obtener espacios disponibles",
            ),
            ClientMessage::RequestActiveTickets => (
                provider
                    .fetch_active_tickets()
                    .await
                    .map(ServerMessage::ActiveTickets),
                "Error al obtener tickets activos",
            ),
            ClientMessage::Unknown => {
                tracing::warn!(connection_id = %self.id, "Unknown message type ignored");
                return None;
            }
        };

        let response = match result {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(
                    connection_id = %self.id,
                    provider = provider.name(),
                    request = ?request,
                    error = %e,
                    "Provider request failed"
                );
                ServerMessage::error(failure)
            }
        };

        Some(response)
    }

    /// Handle one inbound frame
    ///
    /// Returns false if the peer asked to close.
    async fn handle_frame(&self, provider: &dyn DataProvider, frame: Message) -> bool {
        match frame {
            Message::Text(text) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(request) => self.handle_request(provider, request).await,
                    Err(e) => {
                        tracing::warn!(
                            connection_id = %self.id,
                            error = %e,
                            "Invalid client message ignored"
                        );
                    }
                }
                true
            }
            Message::Binary(_) => {
                tracing::debug!(connection_id = %self.id, "Binary frame ignored");
                true
            }
            // Both count as liveness; axum answers pings itself
            Message::Ping(_) | Message::Pong(_) => true,
            Message::Close(_) => {
                tracing::debug!(connection_id = %self.id, "Client requested close");
                false
            }
        }
    }

    /// Inbound activity: runs until the peer leaves, goes idle, errors, or
    /// the connection is closed
    pub async fn read_loop<S>(
        &self,
        mut stream: S,
        provider: &dyn DataProvider,
        pong_wait: Duration,
    ) -> Result<(), ConnectionError>
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let mut closed = self.closed_tx.subscribe();

        loop {
            let stopping = *closed.borrow_and_update();
            if stopping {
                return Ok(());
            }

            let next = tokio::select! {
                _ = closed.changed() => return Ok(()),
                next = timeout(pong_wait, stream.next()) => next,
            };

            match next {
                Err(_) => return Err(ConnectionError::IdleTimeout(pong_wait)),
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => return Err(ConnectionError::Transport(e)),
                Ok(Some(Ok(frame))) => {
                    if !self.handle_frame(provider, frame).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Outbound activity: runs until the queue closes or a write fails
    pub async fn write_loop<S>(
        &self,
        mut outbound: mpsc::Receiver<String>,
        mut sink: S,
        timings: ConnectionTimings,
    ) -> Result<(), ConnectionError>
    where
        S: Sink<Message, Error = axum::Error> + Unpin,
    {
        let mut ticker = interval_at(Instant::now() + timings.ping_period, timings.ping_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = outbound.recv() => {
                    let Some(first) = next else {
                        let _ = write_frame(&mut sink, Message::Close(None), timings.write_wait).await;
                        return Ok(());
                    };

                    let mut batch = first;
                    while let Ok(more) = outbound.try_recv() {
                        batch.push('\n');
                        batch.push_str(&more);
                    }

                    write_frame(&mut sink, Message::Text(batch), timings.write_wait).await?;
                }
                _ = ticker.tick() => {
                    write_frame(&mut sink, Message::Ping(Vec::new()), timings.write_wait).await?;
                }
            }
        }
    }
}

async fn write_frame<S>(sink: &mut S, frame: Message, wait: Duration) -> Result<(), ConnectionError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match timeout(wait, sink.send(frame)).await {
        Ok(result) => result.map_err(ConnectionError::from),
        Err(_) => Err(ConnectionError::WriteTimeout(wait)),
    }
}
