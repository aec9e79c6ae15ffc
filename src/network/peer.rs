//! Peer management for P2P networking
//!
//! Tracks connected peers and the outbound queue of each one.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

/// Maximum number of connected peers
pub const MAX_PEERS: usize = 32;

/// Outbound frames buffered per peer
pub const PEER_QUEUE_SIZE: usize = 256;

/// Peer connection errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Peer disconnected: {0}")]
    Disconnected(SocketAddr),
    #[error("Send queue full for peer {0}")]
    QueueFull(SocketAddr),
    #[error("Unknown peer: {0}")]
    UnknownPeer(SocketAddr),
    #[error("Max peers reached")]
    MaxPeersReached,
}

/// Information about a connected peer
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub addr: SocketAddr,
    /// Whether we dialed this peer
    pub outbound: bool,
    pub connected_at: DateTime<Utc>,
    /// Node id from the last status the peer sent
    pub id: Option<String>,
    /// Chain height from the last status the peer sent
    pub height: Option<u32>,
}

impl PeerInfo {
    pub fn new(addr: SocketAddr, outbound: bool) -> Self {
        Self {
            addr,
            outbound,
            connected_at: Utc::now(),
            id: None,
            height: None,
        }
    }
}

/// Handle for sending frames to a peer
#[derive(Clone)]
pub struct PeerHandle {
    pub addr: SocketAddr,
    pub tx: mpsc::Sender<Bytes>,
}

impl PeerHandle {
    /// Queue a frame without waiting; a full queue drops the frame
    pub fn send(&self, frame: Bytes) -> Result<(), PeerError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => PeerError::QueueFull(self.addr),
            TrySendError::Closed(_) => PeerError::Disconnected(self.addr),
        })
    }
}

/// Manages all peer connections
#[derive(Default)]
pub struct PeerManager {
    peers: RwLock<HashMap<SocketAddr, PeerInfo>>,
    handles: RwLock<HashMap<SocketAddr, PeerHandle>>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new peer
    pub async fn add_peer(&self, handle: PeerHandle, outbound: bool) -> Result<(), PeerError> {
        let addr = handle.addr;
        let mut peers = self.peers.write().await;

        if peers.len() >= MAX_PEERS {
            return Err(PeerError::MaxPeersReached);
        }

        peers.insert(addr, PeerInfo::new(addr, outbound));
        self.handles.write().await.insert(addr, handle);

        log::info!("Added peer: {} (outbound: {})", addr, outbound);
        Ok(())
    }

    /// Remove a peer
    pub async fn remove_peer(&self, addr: &SocketAddr) {
        let removed = self.peers.write().await.remove(addr).is_some();
        self.handles.write().await.remove(addr);

        if removed {
            log::info!("Removed peer: {}", addr);
        }
    }

    /// Record the status a peer announced
    pub async fn update_status(&self, addr: &SocketAddr, id: String, height: u32) {
        if let Some(peer) = self.peers.write().await.get_mut(addr) {
            peer.id = Some(id);
            peer.height = Some(height);
        }
    }

    pub async fn get_peers(&self) -> Vec<SocketAddr> {
        self.peers.read().await.keys().copied().collect()
    }

    pub async fn get_peer_info(&self, addr: &SocketAddr) -> Option<PeerInfo> {
        self.peers.read().await.get(addr).cloned()
    }

    pub async fn get_all_peer_info(&self) -> Vec<PeerInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Send a frame to every peer
    ///
    /// Best effort: a failed send is logged and the rest still receive it.
    pub async fn broadcast(&self, frame: Bytes) {
        let handles = self.handles.read().await;
        for handle in handles.values() {
            if let Err(e) = handle.send(frame.clone()) {
                log::warn!("Failed to send to {}: {}", handle.addr, e);
            }
        }
    }

    /// Send a frame to a specific peer
    pub async fn send_to(&self, addr: &SocketAddr, frame: Bytes) -> Result<(), PeerError> {
        let handle = self
            .handles
            .read()
            .await
            .get(addr)
            .cloned()
            .ok_or(PeerError::UnknownPeer(*addr))?;
        handle.send(frame)
    }
}
