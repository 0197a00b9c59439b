//! WebSocket Connection Hub
//!
//! Owns the set of live connections and the periodic refresh that pushes a
//! fresh dashboard snapshot to all of them.
//!
//! Fan-out never waits on a peer: each connection has a bounded queue and a
//! full queue only costs that peer the message. The connection map lock is
//! held just long enough to copy the member list, so registration and
//! removal are never blocked behind socket I/O.

use axum::extract::ws::Message;
use futures_util::{Sink, Stream};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::connection::{Connection, ConnectionId, ConnectionTimings, EnqueueError};
use super::messages::{ClientMessage, ServerMessage};
use crate::provider::DataProvider;

/// Manages all WebSocket connections and the snapshot refresh
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    provider: Arc<dyn DataProvider>,
    config: HubConfig,
    /// Flips to `true` once; stops the refresh loop and rejects registrations
    shutdown_tx: watch::Sender<bool>,
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Time between snapshot pushes
    pub update_interval: Duration,
    /// Per-connection outbound queue size
    pub queue_capacity: usize,
    /// Idle read deadline
    pub pong_wait: Duration,
    /// Keep-alive ping period, shorter than `pong_wait`
    pub ping_period: Duration,
    /// Deadline for one socket write
    pub write_wait: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(5),
            queue_capacity: 256,
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            write_wait: Duration::from_secs(10),
        }
    }
}

impl HubConfig {
    fn timings(&self) -> ConnectionTimings {
        ConnectionTimings {
            pong_wait: self.pong_wait,
            ping_period: self.ping_period,
            write_wait: self.write_wait,
        }
    }
}

/// Lifecycle of the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Running,
    ShuttingDown,
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("Hub is shutting down")]
    ShuttingDown,
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new(provider: Arc<dyn DataProvider>, config: HubConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            connections: RwLock::new(HashMap::new()),
            provider,
            config,
            shutdown_tx,
        }
    }

    pub fn state(&self) -> HubState {
        if *self.shutdown_tx.borrow() {
            HubState::ShuttingDown
        } else {
            HubState::Running
        }
    }

    /// Create a connection sized for this hub
    pub fn new_connection(&self) -> (Arc<Connection>, mpsc::Receiver<String>) {
        Connection::new(self.config.queue_capacity)
    }

    /// Add a connection and push it one snapshot right away
    ///
    /// The snapshot is fetched before the connection joins, and queued while
    /// the map is locked, so it always precedes any broadcast. Rejected (and
    /// the connection closed) once shutdown has begun.
    pub async fn register(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        if self.state() == HubState::ShuttingDown {
            conn.close();
            return Err(HubError::ShuttingDown);
        }

        let initial = conn
            .respond(self.provider.as_ref(), ClientMessage::RequestSnapshot)
            .await;

        let mut connections = self.connections.write().await;
        if self.state() == HubState::ShuttingDown {
            conn.close();
            return Err(HubError::ShuttingDown);
        }

        if let Some(message) = initial {
            let _ = conn.send(&message);
        }
        connections.insert(conn.id().to_string(), Arc::clone(&conn));
        tracing::info!(
            connection_id = %conn.id(),
            clients = connections.len(),
            "WebSocket connected"
        );

        Ok(())
    }

    /// Remove a connection; unknown ids are a no-op
    ///
    /// Closing the connection is left to its owner.
    pub async fn unregister(&self, id: &str) -> bool {
        let mut connections = self.connections.write().await;

        match connections.remove(id) {
            Some(_) => {
                tracing::info!(
                    connection_id = %id,
                    clients = connections.len(),
                    "WebSocket disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Start the read and write activities of a registered connection
    pub fn attach<W, R>(
        self: &Arc<Self>,
        conn: Arc<Connection>,
        outbound: mpsc::Receiver<String>,
        sink: W,
        stream: R,
    ) -> (JoinHandle<()>, JoinHandle<()>)
    where
        W: Sink<Message, Error = axum::Error> + Unpin + Send + 'static,
        R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
    {
        let timings = self.config.timings();

        let writer = Arc::clone(&conn);
        let write_task = tokio::spawn(async move {
            if let Err(e) = writer.write_loop(outbound, sink, timings).await {
                tracing::debug!(connection_id = %writer.id(), error = %e, "Write loop ended");
            }
            writer.close();
        });

        let hub = Arc::clone(self);
        let reader = conn;
        let read_task = tokio::spawn(async move {
            if let Err(e) = reader
                .read_loop(stream, hub.provider.as_ref(), timings.pong_wait)
                .await
            {
                tracing::debug!(connection_id = %reader.id(), error = %e, "Read loop ended");
            }
            hub.unregister(reader.id()).await;
            reader.close();
        });

        (read_task, write_task)
    }

    /// Send a message to every connection
    ///
    /// Serializes once. Returns the number of connections that accepted it.
    /// Connections whose queue is closed are removed.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let payload = match message.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(kind = message.kind(), error = %e, "Failed to serialize broadcast");
                return 0;
            }
        };

        let targets: Vec<Arc<Connection>> =
            self.connections.read().await.values().cloned().collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for conn in &targets {
            match conn.enqueue(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(EnqueueError::Closed) => dead.push(conn.id().to_string()),
                Err(_) => {}
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for id in &dead {
                if let Some(conn) = connections.remove(id) {
                    conn.close();
                    tracing::debug!(connection_id = %id, "Removed closed connection");
                }
            }
        }

        tracing::trace!(
            kind = message.kind(),
            delivered,
            targets = targets.len(),
            "Broadcast message"
        );

        delivered
    }

    /// Fetch one snapshot and push it to every connection
    ///
    /// A failed fetch skips this round; `None` is returned.
    pub async fn refresh(&self) -> Option<usize> {
        match self.provider.fetch_snapshot().await {
            Ok(snapshot) => Some(self.broadcast(&ServerMessage::DashboardUpdate(snapshot)).await),
            Err(e) => {
                tracing::error!(
                    provider = self.provider.name(),
                    error = %e,
                    "Failed to fetch snapshot, skipping update"
                );
                None
            }
        }
    }

    /// Spawn the periodic refresh
    ///
    /// The first push happens one interval after start. The loop ends when
    /// [`shutdown`](Self::shutdown) is called.
    pub fn start_refresh_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(hub.config.update_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the immediate first tick
            ticker.tick().await;

            tracing::info!(
                interval_secs = hub.config.update_interval.as_secs_f64(),
                "Snapshot refresh started"
            );

            loop {
                let stopping = *shutdown.borrow_and_update();
                if stopping {
                    break;
                }

                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        hub.refresh().await;
                    }
                }
            }

            tracing::info!("Snapshot refresh stopped");
        })
    }

    /// Stop the refresh loop, close every connection and refuse new ones
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }

        let mut connections = self.connections.write().await;
        let count = connections.len();
        for conn in connections.values() {
            conn.close();
        }
        connections.clear();

        tracing::info!(closed = count, "Connection hub shut down");
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::ScriptedProvider;
    use crate::provider::{Snapshot, SpaceOccupiedEvent};
    use chrono::Utc;
    use futures_util::stream;
    use std::pin::Pin;

    fn hub_with(provider: Arc<ScriptedProvider>, config: HubConfig) -> Arc<ConnectionHub> {
        Arc::new(ConnectionHub::new(provider, config))
    }

    fn default_hub() -> (Arc<ConnectionHub>, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(Snapshot::new(5, 3, 8)));
        (hub_with(Arc::clone(&provider), HubConfig::default()), provider)
    }

    fn json(payload: &str) -> serde_json::Value {
        serde_json::from_str(payload).unwrap()
    }

    type TestSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

    /// Sink that forwards frames into a channel the test can inspect
    fn capture_sink() -> (TestSink, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = futures_util::sink::unfold(tx, |tx, frame: Message| async move {
            tx.send(frame).map_err(|_| axum::Error::new("sink closed"))?;
            Ok::<_, axum::Error>(tx)
        });
        (Box::pin(sink), rx)
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.update_interval, Duration::from_secs(5));
        assert!(config.ping_period < config.pong_wait);
    }

    #[tokio::test]
    async fn test_register_pushes_snapshot() {
        let (hub, provider) = default_hub();
        let (conn, mut rx) = hub.new_connection();

        hub.register(Arc::clone(&conn)).await.unwrap();

        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(provider.snapshot_calls(), 1);

        let first = json(&rx.try_recv().unwrap());
        assert_eq!(first["type"], "dashboard_update");
        assert_eq!(first["data"]["espacios_disponibles"], 5);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_register_with_failing_provider() {
        let (hub, provider) = default_hub();
        provider.fail_snapshot(true);
        let (conn, mut rx) = hub.new_connection();

        hub.register(conn).await.unwrap();

        let first = json(&rx.try_recv().unwrap());
        assert_eq!(first["type"], "error");
        assert_eq!(first["data"]["message"], "Error al obtener datos del dashboard");
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_tick_reaches_every_connection() {
        let (hub, _provider) = default_hub();

        let mut receivers = Vec::new();
        for _ in 0..2 {
            let (conn, mut rx) = hub.new_connection();
            hub.register(conn).await.unwrap();
            rx.try_recv().unwrap();
            receivers.push(rx);
        }

        assert_eq!(hub.refresh().await, Some(2));

        for rx in receivers.iter_mut() {
            let update = json(&rx.try_recv().unwrap());
            assert_eq!(update["type"], "dashboard_update");
            assert_eq!(update["data"]["espacios_disponibles"], 5);
            assert_eq!(update["data"]["espacios_ocupados"], 3);
            assert_eq!(update["data"]["total_espacios"], 8);
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_broadcast_payload_shared() {
        let (hub, provider) = default_hub();

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (conn, mut rx) = hub.new_connection();
            hub.register(conn).await.unwrap();
            rx.try_recv().unwrap();
            receivers.push(rx);
        }

        provider.set_snapshot(Snapshot::new(4, 4, 8));
        assert_eq!(hub.refresh().await, Some(3));

        let payloads: Vec<String> = receivers
            .iter_mut()
            .map(|rx| rx.try_recv().unwrap())
            .collect();
        assert!(payloads.iter().all(|p| p == &payloads[0]));
        assert_eq!(json(&payloads[0])["data"]["espacios_ocupados"], 4);
    }

    #[tokio::test]
    async fn test_initial_snapshot_precedes_broadcasts() {
        let (hub, provider) = default_hub();
        provider.delay_snapshot(Duration::from_millis(100));

        let (conn, mut rx) = hub.new_connection();
        let registering = {
            let hub = Arc::clone(&hub);
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { hub.register(conn).await })
        };

        // Not a member while its first snapshot is still being fetched
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.connection_count().await, 0);
        let event = ServerMessage::SpaceOccupied(SpaceOccupiedEvent {
            espacio_id: "e1".to_string(),
            numero: "A-01".to_string(),
            vehiculo_placa: "ABC123".to_string(),
            hora_ingreso: Utc::now(),
        });
        assert_eq!(hub.broadcast(&event).await, 0);

        registering.await.unwrap().unwrap();
        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.broadcast(&event).await, 1);

        assert_eq!(json(&rx.try_recv().unwrap())["type"], "dashboard_update");
        assert_eq!(json(&rx.try_recv().unwrap())["type"], "espacio_ocupado");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_during_registration_rejects() {
        let (hub, provider) = default_hub();
        provider.delay_snapshot(Duration::from_millis(100));

        let (conn, _rx) = hub.new_connection();
        let registering = {
            let hub = Arc::clone(&hub);
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { hub.register(conn).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.shutdown().await;

        assert_eq!(registering.await.unwrap(), Err(HubError::ShuttingDown));
        assert!(conn.is_closed());
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_skips_round() {
        let (hub, provider) = default_hub();
        let (conn, mut rx) = hub.new_connection();
        hub.register(conn).await.unwrap();
        rx.try_recv().unwrap();

        provider.fail_snapshot(true);
        assert_eq!(hub.refresh().await, None);
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.connection_count().await, 1);

        provider.fail_snapshot(false);
        assert_eq!(hub.refresh().await, Some(1));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_full_queue_does_not_block_others() {
        let provider = Arc::new(ScriptedProvider::new(Snapshot::new(5, 3, 8)));
        let config = HubConfig {
            queue_capacity: 1,
            ..HubConfig::default()
        };
        let hub = hub_with(provider, config);

        // Never drained: the initial snapshot fills its queue
        let (stalled, _stalled_rx) = hub.new_connection();
        hub.register(Arc::clone(&stalled)).await.unwrap();

        let (healthy, mut healthy_rx) = hub.new_connection();
        hub.register(healthy).await.unwrap();
        healthy_rx.try_recv().unwrap();

        assert_eq!(hub.refresh().await, Some(1));
        assert!(healthy_rx.try_recv().is_ok());

        // Dropping a message is not a reason to evict
        assert_eq!(hub.connection_count().await, 2);
        assert!(!stalled.is_closed());
    }

    #[tokio::test]
    async fn test_closed_connection_removed_on_broadcast() {
        let (hub, _provider) = default_hub();

        let (gone, gone_rx) = hub.new_connection();
        hub.register(Arc::clone(&gone)).await.unwrap();
        drop(gone_rx);

        let (alive, mut alive_rx) = hub.new_connection();
        hub.register(alive).await.unwrap();
        alive_rx.try_recv().unwrap();

        assert_eq!(hub.refresh().await, Some(1));
        assert_eq!(hub.connection_count().await, 1);
        assert!(gone.is_closed());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let (hub, _provider) = default_hub();
        let (conn, _rx) = hub.new_connection();
        hub.register(Arc::clone(&conn)).await.unwrap();

        assert!(hub.unregister(conn.id()).await);
        assert!(!hub.unregister(conn.id()).await);
        assert!(!hub.unregister("no-such-id").await);
        assert_eq!(hub.connection_count().await, 0);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_broadcast_event() {
        let (hub, _provider) = default_hub();
        let (conn, mut rx) = hub.new_connection();
        hub.register(conn).await.unwrap();
        rx.try_recv().unwrap();

        let event = ServerMessage::SpaceOccupied(SpaceOccupiedEvent {
            espacio_id: "e1".to_string(),
            numero: "A-01".to_string(),
            vehiculo_placa: "ABC123".to_string(),
            hora_ingreso: Utc::now(),
        });
        assert_eq!(hub.broadcast(&event).await, 1);
        assert_eq!(json(&rx.try_recv().unwrap())["type"], "espacio_ocupado");
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_rejects() {
        let (hub, _provider) = default_hub();
        let (first, _rx1) = hub.new_connection();
        let (second, _rx2) = hub.new_connection();
        hub.register(Arc::clone(&first)).await.unwrap();
        hub.register(Arc::clone(&second)).await.unwrap();

        hub.shutdown().await;
        assert_eq!(hub.state(), HubState::ShuttingDown);
        assert_eq!(hub.connection_count().await, 0);
        assert!(first.is_closed());
        assert!(second.is_closed());

        let (late, _rx3) = hub.new_connection();
        let result = hub.register(Arc::clone(&late)).await;
        assert_eq!(result, Err(HubError::ShuttingDown));
        assert!(late.is_closed());
        assert_eq!(hub.connection_count().await, 0);

        // Second call is a no-op
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_attached_connections() {
        let (hub, _provider) = default_hub();

        let mut tasks = Vec::new();
        let mut sinks = Vec::new();
        for _ in 0..3 {
            let (conn, rx) = hub.new_connection();
            hub.register(Arc::clone(&conn)).await.unwrap();
            let (sink, frames) = capture_sink();
            let (read_task, write_task) =
                hub.attach(conn, rx, sink, stream::pending::<Result<Message, axum::Error>>());
            tasks.push(read_task);
            tasks.push(write_task);
            sinks.push(frames);
        }
        assert_eq!(hub.connection_count().await, 3);

        hub.shutdown().await;

        for task in tasks {
            tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .expect("activity did not stop")
                .unwrap();
        }
        assert_eq!(hub.connection_count().await, 0);

        for mut frames in sinks {
            let mut closes = 0;
            while let Ok(frame) = frames.try_recv() {
                if matches!(frame, Message::Close(_)) {
                    closes += 1;
                }
            }
            assert_eq!(closes, 1);
        }
    }

    #[tokio::test]
    async fn test_refresh_loop_ticks_and_stops() {
        let provider = Arc::new(ScriptedProvider::new(Snapshot::new(5, 3, 8)));
        let config = HubConfig {
            update_interval: Duration::from_millis(40),
            ..HubConfig::default()
        };
        let hub = hub_with(Arc::clone(&provider), config);

        let (conn, mut rx) = hub.new_connection();
        hub.register(conn).await.unwrap();
        rx.try_recv().unwrap();

        let handle = hub.start_refresh_loop();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let mut pushed = 0;
        while rx.try_recv().is_ok() {
            pushed += 1;
        }
        assert!(pushed >= 2, "expected at least 2 pushes, got {}", pushed);

        hub.shutdown().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_loop_waits_one_interval() {
        let provider = Arc::new(ScriptedProvider::new(Snapshot::new(5, 3, 8)));
        let config = HubConfig {
            update_interval: Duration::from_secs(30),
            ..HubConfig::default()
        };
        let hub = hub_with(Arc::clone(&provider), config);

        let (conn, _rx) = hub.new_connection();
        hub.register(conn).await.unwrap();

        let handle = hub.start_refresh_loop();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Only the registration push so far
        assert_eq!(provider.snapshot_calls(), 1);

        hub.shutdown().await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_attached_connection_serves_and_cleans_up() {
        let (hub, _provider) = default_hub();
        let (conn, rx) = hub.new_connection();
        hub.register(Arc::clone(&conn)).await.unwrap();

        let (sink, mut frames) = capture_sink();

        let requests = stream::iter(vec![Ok(Message::Text(
            r#"{"type":"request-available-spaces"}"#.to_string(),
        ))]);

        let (read_task, write_task) = hub.attach(Arc::clone(&conn), rx, sink, requests);
        read_task.await.unwrap();
        write_task.await.unwrap();

        let mut text = String::new();
        let mut saw_close = false;
        while let Ok(frame) = frames.try_recv() {
            match frame {
                Message::Text(batch) => {
                    text.push_str(&batch);
                    text.push('\n');
                }
                Message::Close(_) => saw_close = true,
                _ => {}
            }
        }

        let kinds: Vec<String> = text
            .lines()
            .map(|line| json(line)["type"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(kinds, vec!["dashboard_update", "espacios_disponibles"]);
        assert!(saw_close);
        assert_eq!(hub.connection_count().await, 0);
        assert!(conn.is_closed());
    }
}
