//! P2P Networking module
//!
//! Gossip network for a single-validator chain.
//!
//! # Features
//! - TCP peer connections with magic/length framing
//! - Transaction and block gossip
//! - Status exchange on connect
//! - Validator block production loop

pub mod message;
pub mod node;
pub mod peer;
pub mod server;

pub use message::{
    decode_rpc, DecodeError, DecodedMessage, GetBlocksMessage, GetStatusMessage, Message,
    MessageType, Payload, Rpc, StatusMessage, MAGIC, PROTOCOL_VERSION,
};
pub use node::{
    GenesisAllocation, Node, NodeConfig, NodeError, NodeHandle, NodeStatus, DEFAULT_BLOCK_TIME_MS,
};
pub use peer::{PeerError, PeerHandle, PeerInfo, PeerManager, MAX_PEERS};
pub use server::{connect_to_peer, run_peer, FrameCodec, Server, TcpPeer};
