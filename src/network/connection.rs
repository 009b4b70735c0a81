//! Connection handling
//!
//! A [`Connection`] owns the write half of the transport and the shutdown
//! signal shared by the receive loop and the heartbeat timer. Closing moves
//! it into the terminal [`ConnectionState::Closed`] state exactly once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{watch, Mutex};

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    Closed,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// State of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport open, frames flowing
    Open = 0,
    /// Connection has been closed; terminal
    Closed = 1,
}

/// Connection statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames written, heartbeats included
    pub frames_sent: u64,
    /// Bytes written
    pub bytes_sent: u64,
    /// Frames decoded from the server
    pub frames_received: u64,
}

/// An open link to the server
pub struct Connection<W = OwnedWriteHalf> {
    /// Remote peer address
    remote_addr: SocketAddr,
    /// Write half; one frame is written under the lock at a time, and
    /// a close cancels the write holding it
    writer: Mutex<W>,
    state: AtomicU8,
    shutdown_tx: watch::Sender<bool>,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    frames_received: AtomicU64,
}

impl<W> Connection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W, remote_addr: SocketAddr) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            remote_addr,
            writer: Mutex::new(writer),
            state: AtomicU8::new(ConnectionState::Open as u8),
            shutdown_tx,
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
        }
    }

    /// Get the remote address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::SeqCst) {
            0 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Receiver that changes once the connection closes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Write one complete frame
    pub async fn send(&self, frame: &[u8]) -> ConnectionResult<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        if !self.is_open() {
            return Err(ConnectionError::Closed);
        }

        let mut writer = self.writer.lock().await;
        if !self.is_open() {
            return Err(ConnectionError::Closed);
        }

        // A close abandons a write the peer is not draining.
        tokio::select! {
            result = async {
                writer.write_all(frame).await?;
                writer.flush().await
            } => result?,

            _ = shutdown.changed() => return Err(ConnectionError::Closed),
        }

        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(frame.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get connection statistics
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
        }
    }

    /// Close the connection
    ///
    /// Returns `true` only for the call that performed the close. A write
    /// in flight is cancelled before the transport is shut down.
    pub async fn close(&self) -> bool {
        let closed = self
            .state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closed as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !closed {
            return false;
        }

        let _ = self.shutdown_tx.send(true);

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!("Shutdown of {} failed: {}", self.remote_addr, e);
        }

        true
    }
}
