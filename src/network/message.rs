//! Network message types for P2P communication
//!
//! A message body is a one-byte type tag followed by the JSON encoding of
//! the payload named by that tag. Framing on the TCP stream is handled by
//! [`crate::network::server::FrameCodec`].

use crate::core::{Block, Transaction};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use thiserror::Error;

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Magic bytes for message framing
pub const MAGIC: [u8; 4] = *b"PCHN";

/// Message decoding errors
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Empty message")]
    Empty,
    #[error("Unknown message type: {0:#04x}")]
    UnknownMessageType(u8),
    #[error("Invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// Wire type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Tx = 0x01,
    Block = 0x02,
    GetBlocks = 0x03,
    Status = 0x04,
    GetStatus = 0x05,
}

impl TryFrom<u8> for MessageType {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(MessageType::Tx),
            0x02 => Ok(MessageType::Block),
            0x03 => Ok(MessageType::GetBlocks),
            0x04 => Ok(MessageType::Status),
            0x05 => Ok(MessageType::GetStatus),
            other => Err(DecodeError::UnknownMessageType(other)),
        }
    }
}

/// Request for a range of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlocksMessage {
    pub from_height: u32,
    /// Zero means "up to the tip"
    pub to_height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetStatusMessage {}

/// Chain status announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub id: String,
    pub version: u32,
    pub current_height: u32,
}

/// A tagged, not yet decoded message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageType,
    pub data: Bytes,
}

impl Message {
    pub fn new(header: MessageType, data: impl Into<Bytes>) -> Self {
        Self {
            header,
            data: data.into(),
        }
    }

    /// Encode `payload` under `header`
    pub fn encode<T: Serialize>(header: MessageType, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(header, serde_json::to_vec(payload)?))
    }

    pub fn transaction(tx: &Transaction) -> Result<Self, serde_json::Error> {
        Self::encode(MessageType::Tx, tx)
    }

    pub fn block(block: &Block) -> Result<Self, serde_json::Error> {
        Self::encode(MessageType::Block, block)
    }

    /// Tag byte followed by the payload
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.data.len());
        buf.put_u8(self.header as u8);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    pub fn from_bytes(mut bytes: Bytes) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let header = MessageType::try_from(bytes[0])?;
        let data = bytes.split_off(1);
        Ok(Self { header, data })
    }
}

/// Raw message received from a peer
#[derive(Debug, Clone)]
pub struct Rpc {
    pub from: SocketAddr,
    pub payload: Bytes,
}

/// Typed payload of a decoded message
#[derive(Debug, Clone)]
pub enum Payload {
    Transaction(Transaction),
    Block(Block),
    GetBlocks(GetBlocksMessage),
    GetStatus(GetStatusMessage),
    Status(StatusMessage),
}

impl Payload {
    /// Get message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Payload::Transaction(_) => "Transaction",
            Payload::Block(_) => "Block",
            Payload::GetBlocks(_) => "GetBlocks",
            Payload::GetStatus(_) => "GetStatus",
            Payload::Status(_) => "Status",
        }
    }
}

/// A message with its origin and typed payload
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    pub from: SocketAddr,
    pub payload: Payload,
}

fn parse<'a, T: Deserialize<'a>>(kind: &'static str, data: &'a [u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(data).map_err(|source| DecodeError::Payload { kind, source })
}

/// Decode a raw peer message into its typed payload
pub fn decode_rpc(rpc: Rpc) -> Result<DecodedMessage, DecodeError> {
    let msg = Message::from_bytes(rpc.payload)?;
    let data = &msg.data[..];

    let payload = match msg.header {
        MessageType::Tx => Payload::Transaction(parse("transaction", data)?),
        MessageType::Block => Payload::Block(parse("block", data)?),
        MessageType::GetBlocks => Payload::GetBlocks(parse("get blocks", data)?),
        MessageType::GetStatus => Payload::GetStatus(parse("get status", data)?),
        MessageType::Status => Payload::Status(parse("status", data)?),
    };

    Ok(DecodedMessage {
        from: rpc.from,
        payload,
    })
}
