//! Duenet Client
//!
//! Connects to the server, sends data frames and heartbeats, and hands
//! every decoded frame to the registered callbacks.

use bytes::Bytes;
use serde::Serialize;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{watch, RwLock};

use super::connection::{Connection, ConnectionError};
use super::reader::FrameReader;
use super::NetworkConfig;
use crate::encoding::{Encoding, Json};
use crate::protocol::{Message, Packer, Packet};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error("No server address configured")]
    NoAddress,

    #[error("Connection timeout")]
    Timeout,
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Client state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

/// Called once the connection is up
pub type ConnectHandler<E> = Arc<dyn Fn(&Client<E>) + Send + Sync>;

/// Called once per connection when it goes down
pub type DisconnectHandler<E> = Arc<dyn Fn(&Client<E>) + Send + Sync>;

/// Called for every data frame
pub type ReceiveHandler<E> =
    Arc<dyn Fn(&Client<E>, Message<<E as Encoding>::Data>) + Send + Sync>;

/// Called for every heartbeat, with the server time when it sent one
pub type HeartbeatHandler<E> = Arc<dyn Fn(&Client<E>, Option<i64>) + Send + Sync>;

// A freshly opened connection and the reader for its receive half
type Link<E> = (Arc<Connection>, FrameReader<OwnedReadHalf, E>);

struct Handlers<E: Encoding> {
    connect: Option<ConnectHandler<E>>,
    disconnect: Option<DisconnectHandler<E>>,
    receive: Option<ReceiveHandler<E>>,
    heartbeat: Option<HeartbeatHandler<E>>,
}

impl<E: Encoding> Clone for Handlers<E> {
    fn clone(&self) -> Self {
        Self {
            connect: self.connect.clone(),
            disconnect: self.disconnect.clone(),
            receive: self.receive.clone(),
            heartbeat: self.heartbeat.clone(),
        }
    }
}

impl<E: Encoding> Default for Handlers<E> {
    fn default() -> Self {
        Self {
            connect: None,
            disconnect: None,
            receive: None,
            heartbeat: None,
        }
    }
}

/// Duenet Client
///
/// Cheap to clone; clones share the same connection and callbacks.
pub struct Client<E: Encoding = Json> {
    /// Client configuration
    config: NetworkConfig,
    /// Frame packer shared with the receive loop
    packer: Arc<Packer<E>>,
    /// Heartbeat frame, built once
    heartbeat: Bytes,
    /// Registered callbacks
    handlers: Arc<StdRwLock<Handlers<E>>>,
    /// Current state
    state: Arc<RwLock<ClientState>>,
    /// Live connection, if any
    connection: Arc<RwLock<Option<Arc<Connection>>>>,
}

impl<E: Encoding> Clone for Client<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            packer: self.packer.clone(),
            heartbeat: self.heartbeat.clone(),
            handlers: self.handlers.clone(),
            state: self.state.clone(),
            connection: self.connection.clone(),
        }
    }
}

impl Client<Json> {
    /// Create a client with the default frame layout and JSON payloads
    pub fn new(config: NetworkConfig) -> Self {
        Self::with_packer(config, Packer::json())
    }
}

impl<E: Encoding> Client<E> {
    /// Create a client with a custom packer
    pub fn with_packer(config: NetworkConfig, packer: Packer<E>) -> Self {
        let heartbeat = packer.pack_heartbeat();

        Self {
            config,
            packer: Arc::new(packer),
            heartbeat,
            handlers: Arc::new(StdRwLock::new(Handlers::default())),
            state: Arc::new(RwLock::new(ClientState::Disconnected)),
            connection: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn packer(&self) -> &Packer<E> {
        &self.packer
    }

    /// Set the connect callback
    pub fn on_connect<F>(&self, handler: F)
    where
        F: Fn(&Client<E>) + Send + Sync + 'static,
    {
        self.update_handlers(|h| h.connect = Some(Arc::new(handler)));
    }

    /// Set the disconnect callback
    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn(&Client<E>) + Send + Sync + 'static,
    {
        self.update_handlers(|h| h.disconnect = Some(Arc::new(handler)));
    }

    /// Set the receive callback
    pub fn on_receive<F>(&self, handler: F)
    where
        F: Fn(&Client<E>, Message<E::Data>) + Send + Sync + 'static,
    {
        self.update_handlers(|h| h.receive = Some(Arc::new(handler)));
    }

    /// Set the heartbeat callback
    pub fn on_heartbeat<F>(&self, handler: F)
    where
        F: Fn(&Client<E>, Option<i64>) + Send + Sync + 'static,
    {
        self.update_handlers(|h| h.heartbeat = Some(Arc::new(handler)));
    }

    fn update_handlers(&self, f: impl FnOnce(&mut Handlers<E>)) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut handlers);
    }

    // Snapshot, so no lock is held while user code runs.
    fn handlers(&self) -> Handlers<E> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Connect to the configured server address
    pub async fn connect(&self) -> ClientResult<()> {
        let addr = self.config.address.clone().ok_or(ClientError::NoAddress)?;
        self.connect_to(&addr).await
    }

    /// Connect to a server
    ///
    /// On failure the connect callback is not called and nothing is retried.
    pub async fn connect_to(&self, addr: &str) -> ClientResult<()> {
        {
            let mut state = self.state.write().await;
            if *state != ClientState::Disconnected {
                return Err(ClientError::AlreadyConnected);
            }
            *state = ClientState::Connecting;
        }

        match self.open(addr).await {
            Ok(link) => {
                self.start(link).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to connect to {}: {}", addr, e);
                *self.state.write().await = ClientState::Disconnected;
                Err(e)
            }
        }
    }

    async fn open(&self, addr: &str) -> ClientResult<Link<E>> {
        let server_addr = super::resolve_address(addr).await?;

        tracing::info!("Connecting to {}", server_addr);

        let stream = match tokio::time::timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            TcpStream::connect(server_addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ClientError::Io(e)),
            Err(_) => return Err(ClientError::Timeout),
        };
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let connection = Arc::new(Connection::new(write_half, server_addr));
        let reader = FrameReader::new(read_half, self.packer.clone());

        connection.send(&self.heartbeat).await?;

        Ok((connection, reader))
    }

    async fn start(&self, (connection, reader): Link<E>) {
        {
            let mut current = self.connection.write().await;
            *current = Some(connection.clone());
        }
        {
            let mut state = self.state.write().await;
            *state = ClientState::Connected;
        }

        tracing::info!(
            "Connected to {} ({} payloads)",
            connection.remote_addr(),
            self.packer.encoding().name()
        );

        // Subscribed first so a disconnect from inside the callback is seen.
        let receive_shutdown = connection.subscribe();
        let heartbeat_shutdown = connection.subscribe();

        // Runs before the receive loop starts, so it precedes any other callback.
        if let Some(handler) = self.handlers().connect {
            handler(self);
        }

        tokio::spawn(
            self.clone()
                .receive_loop(reader, connection.clone(), receive_shutdown),
        );

        if self.config.heartbeat_interval_ms > 0 {
            let interval = Duration::from_millis(self.config.heartbeat_interval_ms);
            tokio::spawn(
                self.clone()
                    .heartbeat_loop(connection.clone(), interval, heartbeat_shutdown),
            );
        }
    }

    async fn receive_loop(
        self,
        mut reader: FrameReader<OwnedReadHalf, E>,
        connection: Arc<Connection>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let reason = loop {
            tokio::select! {
                result = reader.next_packet() => {
                    match result {
                        Ok(Some(packet)) => {
                            if !connection.is_open() {
                                return;
                            }
                            connection.record_received();
                            self.dispatch(packet);
                        }
                        Ok(None) => {
                            break "connection closed by server".to_string();
                        }
                        Err(e) => {
                            tracing::error!("Receive from {} failed: {}", connection.remote_addr(), e);
                            break format!("receive error: {}", e);
                        }
                    }
                }

                _ = shutdown.changed() => {
                    return;
                }
            }
        };

        self.close(&connection, &reason).await;
    }

    fn dispatch(&self, packet: Packet<E::Data>) {
        match packet {
            Packet::Heartbeat(millisecond) => {
                tracing::trace!("Heartbeat received, server time {:?}", millisecond);
                if let Some(handler) = self.handlers().heartbeat {
                    handler(self, millisecond);
                }
            }
            Packet::Data(message) => {
                tracing::debug!(
                    "Message received: route={}, seq={}",
                    message.route,
                    message.seq
                );
                if let Some(handler) = self.handlers().receive {
                    handler(self, message);
                }
            }
        }
    }

    async fn heartbeat_loop(
        self,
        connection: Arc<Connection>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        // The first heartbeat went out with the connect.
        let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if !connection.is_open() {
                        break;
                    }
                    if let Err(e) = connection.send(&self.heartbeat).await {
                        tracing::warn!("Heartbeat to {} failed: {}", connection.remote_addr(), e);
                    }
                }

                _ = shutdown.changed() => break,
            }
        }
    }

    async fn close(&self, connection: &Arc<Connection>, reason: &str) {
        if !connection.close().await {
            return;
        }

        {
            let mut current = self.connection.write().await;
            if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, connection)) {
                *current = None;
            }
        }
        {
            let mut state = self.state.write().await;
            *state = ClientState::Disconnected;
        }

        let stats = connection.stats();
        tracing::info!(
            "Disconnected from {} ({}); sent {} frames, received {}",
            connection.remote_addr(),
            reason,
            stats.frames_sent,
            stats.frames_received
        );

        if let Some(handler) = self.handlers().disconnect {
            handler(self);
        }
    }

    /// Disconnect from the server
    ///
    /// Calling this while not connected does nothing.
    pub async fn disconnect(&self) {
        let connection = self.connection.read().await.clone();
        if let Some(connection) = connection {
            self.close(&connection, "client disconnect").await;
        }
    }

    /// Send a data frame with a raw payload
    ///
    /// Returns `false` if not connected or the write fails.
    pub async fn send(&self, route: u32, seq: Option<u32>, payload: &[u8]) -> bool {
        match self.packer.pack_message(route, seq, payload) {
            Ok(frame) => self.send_frame(route, &frame).await,
            Err(e) => {
                tracing::warn!("Failed to pack message for route {}: {}", route, e);
                false
            }
        }
    }

    /// Send a data frame, encoding `value` with the packer's encoding
    pub async fn send_value<T: Serialize + ?Sized>(
        &self,
        route: u32,
        seq: Option<u32>,
        value: &T,
    ) -> bool {
        match self.packer.pack_value(route, seq, value) {
            Ok(frame) => self.send_frame(route, &frame).await,
            Err(e) => {
                tracing::warn!("Failed to pack message for route {}: {}", route, e);
                false
            }
        }
    }

    async fn send_frame(&self, route: u32, frame: &[u8]) -> bool {
        let connection = match self.current_connection().await {
            Some(connection) => connection,
            None => {
                tracing::debug!("Dropping message for route {}: {}", route, ClientError::NotConnected);
                return false;
            }
        };

        match connection.send(frame).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Send to {} failed: {}", connection.remote_addr(), e);
                false
            }
        }
    }

    async fn current_connection(&self) -> Option<Arc<Connection>> {
        if *self.state.read().await != ClientState::Connected {
            return None;
        }
        self.connection
            .read()
            .await
            .as_ref()
            .filter(|c| c.is_open())
            .cloned()
    }

    /// Get the current state
    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    /// Check if connected
    pub async fn is_connected(&self) -> bool {
        self.current_connection().await.is_some()
    }
}
