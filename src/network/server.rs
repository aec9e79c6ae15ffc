//! TCP server and connection handling
//!
//! Accepts and dials peer connections and runs the per-peer read and write
//! loops. Each frame is `MAGIC | length (u32 BE) | body`.

use crate::network::message::{Rpc, MAGIC};
use crate::network::peer::{PeerError, PeerHandle, PeerManager, PEER_QUEUE_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, Framed};

/// Frame header: magic + length
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest accepted frame body
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Codec for magic-prefixed, length-prefixed frames
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Encoder<Bytes> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_FRAME_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Frame too large: {} bytes", item.len()),
            ));
        }

        dst.reserve(FRAME_HEADER_SIZE + item.len());
        dst.put_slice(&MAGIC);
        dst.put_u32(item.len() as u32);
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        if src[..4] != MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Invalid magic bytes",
            ));
        }

        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Frame too large: {} bytes", len),
            ));
        }

        if src.len() < FRAME_HEADER_SIZE + len {
            src.reserve(FRAME_HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        Ok(Some(src.split_to(len).freeze()))
    }
}

/// TCP server for accepting peer connections
pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub async fn bind(addr: &str) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("Server listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), std::io::Error> {
        self.listener.accept().await
    }
}

/// A freshly established connection, not yet registered
#[derive(Debug)]
pub struct TcpPeer {
    pub stream: TcpStream,
    pub addr: SocketAddr,
    pub outbound: bool,
}

/// Connect to a peer
pub async fn connect_to_peer(addr: &str) -> Result<TcpPeer, PeerError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PeerError::ConnectionFailed(format!("{}: {}", addr, e)))?;

    let peer_addr = stream
        .peer_addr()
        .map_err(|e| PeerError::ConnectionFailed(e.to_string()))?;

    Ok(TcpPeer {
        stream,
        addr: peer_addr,
        outbound: true,
    })
}

/// Register a connection and start its read and write loops
///
/// Every frame read is forwarded to `rpc_tx`. The peer is removed from
/// `peer_manager` when the connection closes or sends a bad frame.
pub async fn run_peer(
    peer: TcpPeer,
    peer_manager: Arc<PeerManager>,
    rpc_tx: mpsc::Sender<Rpc>,
) -> Result<(), PeerError> {
    let TcpPeer {
        stream,
        addr,
        outbound,
    } = peer;

    let (mut writer, mut reader) = Framed::new(stream, FrameCodec).split();
    let (tx, mut rx) = mpsc::channel::<Bytes>(PEER_QUEUE_SIZE);
    peer_manager.add_peer(PeerHandle { addr, tx }, outbound).await?;

    let write_handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = writer.send(frame).await {
                log::warn!("Error writing to {}: {}", addr, e);
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match reader.next().await {
                Some(Ok(payload)) => {
                    if rpc_tx.send(Rpc { from: addr, payload }).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    log::warn!("Error reading from {}: {}", addr, e);
                    break;
                }
                None => {
                    log::info!("Peer {} disconnected", addr);
                    break;
                }
            }
        }

        write_handle.abort();
        peer_manager.remove_peer(&addr).await;
    });

    Ok(())
}
