//! P2P Node implementation
//!
//! The node binds the peer listener, dials seed nodes, and runs one dispatch
//! loop over new peer connections, decoded peer messages, locally submitted
//! transactions and the shutdown signal. A node configured with a validator
//! key also runs a timer loop that produces a block every `block_time_ms`.
//!
//! The ledger, mempool and peer table are each internally synchronized, so
//! the validator loop and the dispatch loop may mutate them concurrently.

use crate::core::{Block, BlockError, Blockchain, ChainError, Transaction, TransactionError};
use crate::crypto::{Address, Hash, KeyError, KeyPair};
use crate::mining::{BlockProducer, Mempool, MempoolError, SingleValidator, DEFAULT_MEMPOOL_CAPACITY};
use crate::network::message::{
    decode_rpc, DecodeError, DecodedMessage, GetStatusMessage, Message, MessageType, Payload,
    Rpc, StatusMessage, PROTOCOL_VERSION,
};
use crate::network::peer::{PeerError, PeerInfo, PeerManager};
use crate::network::server::{connect_to_peer, run_peer, Server, TcpPeer};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

/// Default block interval
pub const DEFAULT_BLOCK_TIME_MS: u64 = 5_000;

// =============================================================================
// Errors
// =============================================================================

/// Node errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Block error: {0}")]
    Block(#[from] BlockError),
    #[error("Mempool error: {0}")]
    Mempool(#[from] MempoolError),
    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Node is not running")]
    Stopped,
}

impl NodeError {
    /// Re-delivery of an applied block, expected under gossip
    pub fn is_block_known(&self) -> bool {
        matches!(self, NodeError::Chain(ChainError::BlockKnown(_)))
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Balance credited at genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: Address,
    pub balance: u64,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node id announced in status messages
    pub id: String,
    /// Peer listener address
    pub listen_addr: String,
    /// Peers dialed on start
    pub seed_nodes: Vec<String>,
    pub block_time_ms: u64,
    /// Hex secp256k1 secret key; only the validator sets this
    pub validator_key: Option<String>,
    /// HTTP API address, if the API should run
    pub api_listen_addr: Option<String>,
    pub mempool_capacity: usize,
    pub genesis_allocations: Vec<GenesisAllocation>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: "NODE".to_string(),
            listen_addr: "127.0.0.1:3000".to_string(),
            seed_nodes: Vec::new(),
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
            validator_key: None,
            api_listen_addr: None,
            mempool_capacity: DEFAULT_MEMPOOL_CAPACITY,
            genesis_allocations: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms.max(1))
    }

    pub fn validator_keypair(&self) -> Result<Option<KeyPair>, KeyError> {
        self.validator_key
            .as_deref()
            .map(KeyPair::from_private_key_hex)
            .transpose()
    }
}

// =============================================================================
// Node Handle
// =============================================================================

/// Node status information
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub id: String,
    pub listen_addr: SocketAddr,
    pub version: u32,
    pub height: u32,
    pub current_hash: Hash,
    pub pending_transactions: usize,
    pub validator: Option<Address>,
    pub peers: Vec<PeerInfo>,
}

/// Cloneable handle to a node's shared state
#[derive(Clone)]
pub struct NodeHandle {
    id: String,
    local_addr: SocketAddr,
    validator: Option<Address>,
    chain: Arc<Blockchain>,
    mempool: Arc<Mempool>,
    peer_manager: Arc<PeerManager>,
    submit_tx: mpsc::Sender<Transaction>,
    shutdown_tx: mpsc::Sender<()>,
}

impl NodeHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn chain(&self) -> &Arc<Blockchain> {
        &self.chain
    }

    pub fn mempool(&self) -> &Arc<Mempool> {
        &self.mempool
    }

    pub fn peer_manager(&self) -> &Arc<PeerManager> {
        &self.peer_manager
    }

    /// Queue a transaction on the dispatch loop's intake path
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<(), NodeError> {
        self.submit_tx.send(tx).await.map_err(|_| NodeError::Stopped)
    }

    /// Route a decoded peer message
    pub async fn process_message(&self, msg: DecodedMessage) -> Result<(), NodeError> {
        log::debug!("Received {} from {}", msg.payload.type_name(), msg.from);

        match msg.payload {
            Payload::Transaction(tx) => self.process_transaction(tx).await,
            Payload::Block(block) => self.process_block(block).await,
            Payload::GetBlocks(request) => {
                // Chain sync is not served; the request is only recorded
                log::info!(
                    "GetBlocks from {}: {}..{}",
                    msg.from,
                    request.from_height,
                    request.to_height
                );
                Ok(())
            }
            Payload::GetStatus(_) => self.send_status(msg.from).await,
            Payload::Status(status) => {
                log::info!(
                    "Status from {}: id={} version={} height={}",
                    msg.from,
                    status.id,
                    status.version,
                    status.current_height
                );
                self.peer_manager
                    .update_status(&msg.from, status.id, status.current_height)
                    .await;
                Ok(())
            }
        }
    }

    /// Verify a new transaction, gossip it and add it to the mempool
    ///
    /// Transactions already pending or already applied are ignored.
    pub async fn process_transaction(&self, tx: Transaction) -> Result<(), NodeError> {
        let hash = tx.compute_hash();

        if self.mempool.contains(&hash).await || self.chain.contains_transaction(&hash).await {
            log::debug!("Ignoring known transaction {}", hash);
            return Ok(());
        }

        tx.verify()?;

        self.broadcast(Message::transaction(&tx)?);
        self.mempool.add(tx).await?;

        log::debug!(
            "Added transaction {} to mempool ({} pending)",
            hash,
            self.mempool.pending_count().await
        );
        Ok(())
    }

    /// Apply a received block and gossip it on success
    pub async fn process_block(&self, block: Block) -> Result<(), NodeError> {
        self.chain.add_block(block.clone()).await?;

        let included: Vec<Hash> = block
            .transactions()
            .iter()
            .map(Transaction::compute_hash)
            .collect();
        self.mempool.remove_batch(&included).await;

        self.broadcast(Message::block(&block)?);
        Ok(())
    }

    /// Build a block from the pending transactions, apply it and gossip it
    pub async fn produce_block(&self, producer: &dyn BlockProducer) -> Result<Block, NodeError> {
        let prev = self.chain.current_header().await;
        let pending = self.mempool.pending().await;
        let included: Vec<Hash> = pending.iter().map(Transaction::hash).collect();

        let block = producer.produce(&prev, pending)?;
        self.chain.add_block(block.clone()).await?;
        self.mempool.remove_batch(&included).await;

        self.broadcast(Message::block(&block)?);
        Ok(block)
    }

    async fn send_status(&self, to: SocketAddr) -> Result<(), NodeError> {
        let status = StatusMessage {
            id: self.id.clone(),
            version: PROTOCOL_VERSION,
            current_height: self.chain.height().await,
        };
        let msg = Message::encode(MessageType::Status, &status)?;
        self.peer_manager.send_to(&to, msg.to_bytes()).await?;
        Ok(())
    }

    async fn request_status(&self, to: SocketAddr) -> Result<(), NodeError> {
        let msg = Message::encode(MessageType::GetStatus, &GetStatusMessage {})?;
        self.peer_manager.send_to(&to, msg.to_bytes()).await?;
        Ok(())
    }

    /// Fire-and-forget gossip to every peer
    fn broadcast(&self, msg: Message) {
        let peer_manager = self.peer_manager.clone();
        let frame = msg.to_bytes();
        tokio::spawn(async move {
            peer_manager.broadcast(frame).await;
        });
    }

    pub async fn status(&self) -> NodeStatus {
        let current = self.chain.current_header().await;
        NodeStatus {
            id: self.id.clone(),
            listen_addr: self.local_addr,
            version: PROTOCOL_VERSION,
            height: current.height,
            current_hash: current.hash(),
            pending_transactions: self.mempool.pending_count().await,
            validator: self.validator,
            peers: self.peer_manager.get_all_peer_info().await,
        }
    }

    /// Stop the dispatch loop
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Node
// =============================================================================

/// The main P2P node
pub struct Node {
    config: NodeConfig,
    server: Server,
    handle: NodeHandle,
    producer: Option<Arc<dyn BlockProducer>>,
    submit_rx: mpsc::Receiver<Transaction>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Node {
    /// Bind the peer listener and build the ledger
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let server = Server::bind(&config.listen_addr).await?;
        let local_addr = server.local_addr()?;

        let allocations: Vec<(Address, u64)> = config
            .genesis_allocations
            .iter()
            .map(|alloc| (alloc.address, alloc.balance))
            .collect();
        let chain = Blockchain::with_allocations(Block::genesis(), &allocations).await?;

        let key = config.validator_keypair()?;
        let validator = key.as_ref().map(KeyPair::address);
        let producer = key.map(|key| Arc::new(SingleValidator::new(key)) as Arc<dyn BlockProducer>);

        let (submit_tx, submit_rx) = mpsc::channel(1024);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = NodeHandle {
            id: config.id.clone(),
            local_addr,
            validator,
            chain: Arc::new(chain),
            mempool: Arc::new(Mempool::with_capacity(config.mempool_capacity)),
            peer_manager: Arc::new(PeerManager::new()),
            submit_tx,
            shutdown_tx,
        };

        Ok(Self {
            config,
            server,
            handle,
            producer,
            submit_rx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.handle.local_addr
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// Run the node until shutdown
    pub async fn start(self) -> Result<(), NodeError> {
        let Node {
            config,
            server,
            handle,
            producer,
            mut submit_rx,
            mut shutdown_rx,
        } = self;

        let (peer_tx, mut peer_rx) = mpsc::channel::<TcpPeer>(32);
        let (rpc_tx, mut rpc_rx) = mpsc::channel::<Rpc>(1024);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        tasks.push(tokio::spawn(accept_loop(server, peer_tx.clone())));

        for seed in config.seed_nodes.iter().cloned() {
            let peer_tx = peer_tx.clone();
            tasks.push(tokio::spawn(async move {
                match connect_to_peer(&seed).await {
                    Ok(peer) => {
                        let _ = peer_tx.send(peer).await;
                    }
                    Err(e) => log::warn!("Could not connect to seed {}: {}", seed, e),
                }
            }));
        }

        if let Some(producer) = producer {
            tasks.push(tokio::spawn(validator_loop(
                handle.clone(),
                producer,
                config.block_time(),
            )));
        }

        if let Some(api_addr) = config.api_listen_addr.clone() {
            let state = crate::api::ApiState::new(handle.clone());
            tasks.push(tokio::spawn(async move {
                if let Err(e) = crate::api::serve(&api_addr, state).await {
                    log::error!("API server on {} failed: {}", api_addr, e);
                }
            }));
        }

        log::info!(
            "Node {} accepting TCP connections on {}",
            handle.id,
            handle.local_addr
        );

        loop {
            tokio::select! {
                Some(peer) = peer_rx.recv() => {
                    let addr = peer.addr;
                    let outbound = peer.outbound;
                    if let Err(e) = run_peer(peer, handle.peer_manager.clone(), rpc_tx.clone()).await {
                        log::warn!("Could not register peer {}: {}", addr, e);
                        continue;
                    }
                    if outbound {
                        if let Err(e) = handle.request_status(addr).await {
                            log::warn!("Could not request status from {}: {}", addr, e);
                        }
                    }
                }
                Some(rpc) = rpc_rx.recv() => {
                    match decode_rpc(rpc) {
                        Ok(msg) => {
                            if let Err(e) = handle.process_message(msg).await {
                                log_dispatch_error(&e);
                            }
                        }
                        Err(e) => log::warn!("Dropping message: {}", e),
                    }
                }
                Some(tx) = submit_rx.recv() => {
                    if let Err(e) = handle.process_transaction(tx).await {
                        log_dispatch_error(&e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    log::info!("Node {} shutting down", handle.id);
                    break;
                }
            }
        }

        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

fn log_dispatch_error(e: &NodeError) {
    if e.is_block_known() {
        log::debug!("{}", e);
    } else if matches!(e, NodeError::Peer(_)) {
        log::warn!("{}", e);
    } else {
        log::error!("{}", e);
    }
}

async fn accept_loop(server: Server, peer_tx: mpsc::Sender<TcpPeer>) {
    loop {
        match server.accept().await {
            Ok((stream, addr)) => {
                log::info!("Incoming connection from {}", addr);
                let peer = TcpPeer {
                    stream,
                    addr,
                    outbound: false,
                };
                if peer_tx.send(peer).await.is_err() {
                    break;
                }
            }
            Err(e) => log::error!("Accept error: {}", e),
        }
    }
}

async fn validator_loop(handle: NodeHandle, producer: Arc<dyn BlockProducer>, block_time: Duration) {
    log::info!(
        "Starting validator loop for {} (block time {:?})",
        producer.public_key().address(),
        block_time
    );

    let mut ticker = interval_at(Instant::now() + block_time, block_time);
    loop {
        ticker.tick().await;
        if let Err(e) = handle.produce_block(producer.as_ref()).await {
            log::error!("Failed to produce block: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::server::FrameCodec;
    use bytes::Bytes;
    use futures::SinkExt;
    use std::future::Future;
    use tokio::net::{TcpSocket, TcpStream};
    use tokio_util::codec::Framed;

    fn test_config(id: &str) -> NodeConfig {
        NodeConfig {
            id: id.to_string(),
            listen_addr: "127.0.0.1:0".to_string(),
            ..Default::default()
        }
    }

    fn funded_config(id: &str, funded: &KeyPair) -> NodeConfig {
        NodeConfig {
            genesis_allocations: vec![GenesisAllocation {
                address: funded.address(),
                balance: 1_000_000,
            }],
            ..test_config(id)
        }
    }

    fn signed_transfer(from: &KeyPair, value: u64) -> Transaction {
        let mut tx = Transaction::transfer(KeyPair::generate().public_key(), value);
        tx.sign(from).unwrap();
        tx
    }

    async fn wait_for<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !condition().await {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_node_creation() {
        let node = Node::new(test_config("A")).await.unwrap();
        let status = node.handle().status().await;

        assert_eq!(status.id, "A");
        assert_eq!(status.height, 0);
        assert_eq!(status.current_hash, Block::genesis().hash());
        assert!(status.peers.is_empty());
        assert!(status.validator.is_none());
    }

    #[tokio::test]
    async fn test_process_transaction() {
        let node = Node::new(test_config("A")).await.unwrap();
        let handle = node.handle();
        let tx = signed_transfer(&KeyPair::generate(), 10);

        handle.process_transaction(tx.clone()).await.unwrap();
        handle.process_transaction(tx.clone()).await.unwrap();
        assert_eq!(handle.mempool().pending().await, vec![tx]);
    }

    #[tokio::test]
    async fn test_process_transaction_rejects_bad_signature() {
        let node = Node::new(test_config("A")).await.unwrap();
        let handle = node.handle();

        let mut tx = signed_transfer(&KeyPair::generate(), 10);
        tx.set_value(11);
        assert!(matches!(
            handle.process_transaction(tx).await,
            Err(NodeError::Transaction(TransactionError::SignatureInvalid(_)))
        ));
        assert_eq!(handle.mempool().pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_process_block_and_block_known() {
        let node = Node::new(test_config("A")).await.unwrap();
        let handle = node.handle();

        let producer = SingleValidator::new(KeyPair::generate());
        let block = producer
            .produce(Block::genesis().header(), Vec::new())
            .unwrap();

        handle.process_block(block.clone()).await.unwrap();
        assert_eq!(handle.chain().height().await, 1);

        let err = handle.process_block(block).await.unwrap_err();
        assert!(err.is_block_known());
    }

    #[tokio::test]
    async fn test_produce_block_drains_mempool() {
        let alice = KeyPair::generate();
        let node = Node::new(funded_config("A", &alice)).await.unwrap();
        let handle = node.handle();
        let producer = SingleValidator::new(KeyPair::generate());

        let tx = signed_transfer(&alice, 1_000);
        handle.process_transaction(tx.clone()).await.unwrap();

        let block = handle.produce_block(&producer).await.unwrap();
        assert_eq!(block.height(), 1);
        assert_eq!(block.transactions(), &[tx.clone()]);
        assert_eq!(handle.mempool().pending_count().await, 0);

        let chain = handle.chain();
        assert_eq!(chain.get_transaction_by_hash(&tx.hash()).await.unwrap(), tx);
        assert_eq!(
            chain.accounts().get_balance(&alice.address()).await.unwrap(),
            999_000
        );

        // Already applied: re-delivery does not return it to the mempool
        handle.process_transaction(tx).await.unwrap();
        assert_eq!(handle.mempool().pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_validator_loop_produces_blocks() {
        let config = NodeConfig {
            block_time_ms: 50,
            validator_key: Some(KeyPair::generate().private_key_hex()),
            ..test_config("VALIDATOR")
        };
        let node = Node::new(config).await.unwrap();
        let handle = node.handle();
        assert!(handle.status().await.validator.is_some());
        tokio::spawn(node.start());

        let chain = handle.chain().clone();
        wait_for(|| {
            let chain = chain.clone();
            async move { chain.height().await >= 2 }
        })
        .await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_gossip_between_nodes() {
        let alice = KeyPair::generate();

        let node_a = Node::new(funded_config("NODE_A", &alice)).await.unwrap();
        let handle_a = node_a.handle();
        let node_b = Node::new(NodeConfig {
            seed_nodes: vec![handle_a.local_addr().to_string()],
            ..funded_config("NODE_B", &alice)
        })
        .await
        .unwrap();
        let handle_b = node_b.handle();

        tokio::spawn(node_a.start());
        tokio::spawn(node_b.start());

        // B dials A and learns its status
        let pm_b = handle_b.peer_manager().clone();
        wait_for(|| {
            let pm = pm_b.clone();
            async move {
                pm.get_all_peer_info()
                    .await
                    .iter()
                    .any(|p| p.id.as_deref() == Some("NODE_A"))
            }
        })
        .await;

        // A transaction submitted at B reaches A's mempool
        let tx = signed_transfer(&alice, 500);
        handle_b.submit_transaction(tx.clone()).await.unwrap();
        let mempool_a = handle_a.mempool().clone();
        let hash = tx.hash();
        wait_for(|| {
            let mempool = mempool_a.clone();
            async move { mempool.contains(&hash).await }
        })
        .await;

        // A block produced at A is applied at B
        let producer = SingleValidator::new(KeyPair::generate());
        handle_a.produce_block(&producer).await.unwrap();
        let chain_b = handle_b.chain().clone();
        wait_for(|| {
            let chain = chain_b.clone();
            async move { chain.contains_transaction(&hash).await }
        })
        .await;

        assert_eq!(handle_b.chain().height().await, 1);
        assert_eq!(
            handle_b
                .chain()
                .accounts()
                .get_balance(&alice.address())
                .await
                .unwrap(),
            999_500
        );
        assert_eq!(handle_b.mempool().pending_count().await, 0);

        handle_a.shutdown().await;
        handle_b.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_message_keeps_connection_open() {
        let node = Node::new(test_config("A")).await.unwrap();
        let handle = node.handle();
        tokio::spawn(node.start());

        let stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        let mut framed = Framed::new(stream, FrameCodec);

        framed
            .send(Bytes::from_static(&[0x7f, b'{', b'}']))
            .await
            .unwrap();
        framed
            .send(Bytes::from_static(&[0x01, b'n', b'o']))
            .await
            .unwrap();

        let tx = signed_transfer(&KeyPair::generate(), 1);
        framed
            .send(Message::transaction(&tx).unwrap().to_bytes())
            .await
            .unwrap();

        let mempool = handle.mempool().clone();
        let hash = tx.hash();
        wait_for(|| {
            let mempool = mempool.clone();
            async move { mempool.contains(&hash).await }
        })
        .await;

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_unread_peer_does_not_stall_dispatch() {
        let node = Node::new(test_config("A")).await.unwrap();
        let handle = node.handle();
        tokio::spawn(node.start());

        let socket = TcpSocket::new_v4().unwrap();
        socket.set_recv_buffer_size(4096).unwrap();
        let stream = socket.connect(handle.local_addr()).await.unwrap();
        let mut framed = Framed::new(stream, FrameCodec);
        let request = Message::encode(MessageType::GetStatus, &GetStatusMessage {})
            .unwrap()
            .to_bytes();

        // Ask for status over and over without reading a single reply
        let flood = tokio::spawn(async move {
            for _ in 0..200_000 {
                if framed.feed(request.clone()).await.is_err() {
                    return;
                }
            }
            let _ = framed.flush().await;
            std::future::pending::<()>().await;
        });
        tokio::time::sleep(Duration::from_secs(2)).await;

        let tx = signed_transfer(&KeyPair::generate(), 1);
        handle.submit_transaction(tx.clone()).await.unwrap();

        let mempool = handle.mempool().clone();
        let hash = tx.hash();
        wait_for(|| {
            let mempool = mempool.clone();
            async move { mempool.contains(&hash).await }
        })
        .await;

        flood.abort();
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispatch_over_in_memory_peer() {
        let alice = KeyPair::generate();
        let node = Node::new(funded_config("A", &alice)).await.unwrap();
        let handle = node.handle();

        // A peer backed only by a channel, no socket
        let (peer_tx, mut peer_rx) = mpsc::channel(8);
        let from: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        handle
            .peer_manager()
            .add_peer(crate::network::PeerHandle { addr: from, tx: peer_tx }, false)
            .await
            .unwrap();
        let deliver = |frame: bytes::Bytes| decode_rpc(Rpc { from, payload: frame }).unwrap();

        // GetStatus is answered to the asking peer
        let request = Message::encode(MessageType::GetStatus, &GetStatusMessage {}).unwrap();
        handle.process_message(deliver(request.to_bytes())).await.unwrap();
        let reply = decode_rpc(Rpc {
            from,
            payload: peer_rx.recv().await.unwrap(),
        })
        .unwrap();
        let Payload::Status(status) = reply.payload else {
            panic!("expected a status reply");
        };
        assert_eq!(status.id, "A");
        assert_eq!(status.current_height, 0);

        // Status updates the peer table
        let status = StatusMessage {
            id: "REMOTE_NODE".to_string(),
            version: PROTOCOL_VERSION,
            current_height: 3,
        };
        let msg = Message::encode(MessageType::Status, &status).unwrap();
        handle.process_message(deliver(msg.to_bytes())).await.unwrap();
        let info = handle.peer_manager().get_peer_info(&from).await.unwrap();
        assert_eq!(info.id.as_deref(), Some("REMOTE_NODE"));
        assert_eq!(info.height, Some(3));

        // A transaction lands in the mempool and is gossiped back out
        let tx = signed_transfer(&alice, 5);
        let msg = Message::transaction(&tx).unwrap();
        handle.process_message(deliver(msg.to_bytes())).await.unwrap();
        assert!(handle.mempool().contains(&tx.hash()).await);
        assert_eq!(peer_rx.recv().await.unwrap(), msg.to_bytes());

        // A block is applied and gossiped
        let block = SingleValidator::new(KeyPair::generate())
            .produce(Block::genesis().header(), vec![tx.clone()])
            .unwrap();
        let msg = Message::block(&block).unwrap();
        handle.process_message(deliver(msg.to_bytes())).await.unwrap();
        assert_eq!(handle.chain().height().await, 1);
        assert!(!handle.mempool().contains(&tx.hash()).await);
        assert_eq!(peer_rx.recv().await.unwrap(), msg.to_bytes());

        // Redelivery of the same block is reported as already known
        let err = handle
            .process_message(deliver(msg.to_bytes()))
            .await
            .unwrap_err();
        assert!(err.is_block_known());
    }

    #[test]
    fn test_config_from_file() {
        let alice = KeyPair::generate();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(
            &path,
            format!(
                r#"{{
                    "id": "LOCAL_NODE",
                    "listen_addr": "127.0.0.1:3000",
                    "seed_nodes": ["127.0.0.1:4000"],
                    "validator_key": "{}",
                    "genesis_allocations": [{{ "address": "{}", "balance": 42 }}]
                }}"#,
                alice.private_key_hex(),
                alice.address()
            ),
        )
        .unwrap();

        let config = NodeConfig::from_file(&path).unwrap();
        assert_eq!(config.id, "LOCAL_NODE");
        assert_eq!(config.seed_nodes, vec!["127.0.0.1:4000".to_string()]);
        assert_eq!(config.block_time(), Duration::from_millis(DEFAULT_BLOCK_TIME_MS));
        assert_eq!(config.mempool_capacity, DEFAULT_MEMPOOL_CAPACITY);
        assert_eq!(
            config.validator_keypair().unwrap().unwrap().address(),
            alice.address()
        );
        assert_eq!(config.genesis_allocations[0].balance, 42);
    }
}
