//! REST API handlers for chain queries and transaction submission

use crate::core::{Block, ChainError, Transaction};
use crate::crypto::{Address, Hash};
use crate::network::{NodeHandle, NodeStatus};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub node: NodeHandle,
}

impl ApiState {
    pub fn new(node: NodeHandle) -> Self {
        Self { node }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BlockView {
    pub hash: Hash,
    pub version: u32,
    pub height: u32,
    pub payload_digest: Hash,
    pub parent_hash: Hash,
    pub timestamp: DateTime<Utc>,
    pub validator_address: Option<Address>,
    pub signature: Option<String>,
    pub transaction_count: usize,
    pub transaction_hashes: Vec<Hash>,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        let header = block.header();
        Self {
            hash: block.hash(),
            version: header.version,
            height: header.height,
            payload_digest: header.payload_digest,
            parent_hash: header.parent_hash,
            timestamp: DateTime::from_timestamp_nanos(header.timestamp),
            validator_address: block.validator().map(|key| key.address()),
            signature: block.signature().map(|sig| sig.to_hex()),
            transaction_count: block.tx_count(),
            transaction_hashes: block
                .transactions()
                .iter()
                .map(Transaction::compute_hash)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub hash: Hash,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub address: Address,
    pub balance: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn api_error(status: StatusCode, error: impl ToString) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: error.to_string(),
        }),
    )
}

fn chain_error(e: ChainError) -> (StatusCode, Json<ApiError>) {
    let status = match e {
        ChainError::HeightOutOfRange { .. }
        | ChainError::BlockNotFound(_)
        | ChainError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    api_error(status, e)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /block/{id} - Get block by height, or by hash if `id` is not a number
pub async fn get_block(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<BlockView> {
    let chain = state.node.chain();

    let block = match id.parse::<u32>() {
        Ok(height) => chain.get_block(height).await,
        Err(_) => {
            let hash: Hash = id
                .parse()
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
            chain.get_block_by_hash(&hash).await
        }
    }
    .map_err(chain_error)?;

    Ok(Json(BlockView::from(&block)))
}

/// GET /tx/{hash} - Get an applied transaction
pub async fn get_transaction(
    State(state): State<ApiState>,
    Path(hash): Path<String>,
) -> ApiResult<Transaction> {
    let hash: Hash = hash
        .parse()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    state
        .node
        .chain()
        .get_transaction_by_hash(&hash)
        .await
        .map(Json)
        .map_err(chain_error)
}

/// POST /tx - Submit a signed transaction
pub async fn post_transaction(
    State(state): State<ApiState>,
    Json(tx): Json<Transaction>,
) -> ApiResult<SubmitResponse> {
    tx.verify()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let hash = tx.compute_hash();
    state
        .node
        .submit_transaction(tx)
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e))?;

    Ok(Json(SubmitResponse { hash }))
}

/// GET /account/{address} - Get an account balance
pub async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<BalanceResponse> {
    let address: Address = address
        .parse()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let balance = state
        .node
        .chain()
        .accounts()
        .get_balance(&address)
        .await
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e))?;

    Ok(Json(BalanceResponse { address, balance }))
}

/// GET /status - Node status
pub async fn get_status(State(state): State<ApiState>) -> Json<NodeStatus> {
    Json(state.node.status().await)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::mining::{BlockProducer, SingleValidator};
    use crate::network::{GenesisAllocation, Node, NodeConfig};

    async fn setup(funded: &KeyPair) -> (Node, ApiState) {
        let config = NodeConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            genesis_allocations: vec![GenesisAllocation {
                address: funded.address(),
                balance: 100,
            }],
            ..Default::default()
        };
        let node = Node::new(config).await.unwrap();
        let state = ApiState::new(node.handle());
        (node, state)
    }

    #[tokio::test]
    async fn test_get_block_by_height_and_hash() {
        let (_node, state) = setup(&KeyPair::generate()).await;
        let producer = SingleValidator::new(KeyPair::generate());
        let block = state.node.produce_block(&producer).await.unwrap();

        let by_height = get_block(State(state.clone()), Path("1".to_string()))
            .await
            .unwrap();
        assert_eq!(by_height.hash, block.hash());
        assert_eq!(
            by_height.validator_address,
            Some(producer.public_key().address())
        );

        let by_hash = get_block(State(state.clone()), Path(block.hash().to_hex()))
            .await
            .unwrap();
        assert_eq!(by_hash.height, 1);
        assert_eq!(by_hash.parent_hash, Block::genesis().hash());
    }

    #[tokio::test]
    async fn test_get_block_errors() {
        let (_node, state) = setup(&KeyPair::generate()).await;

        let (status, _) = get_block(State(state.clone()), Path("7".to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_block(State(state.clone()), Path("not-a-hash".to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_block(State(state), Path(Hash::random().to_hex()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_transaction_and_balance() {
        let alice = KeyPair::generate();
        let (_node, state) = setup(&alice).await;

        let mut tx = Transaction::transfer(KeyPair::generate().public_key(), 40);
        tx.sign(&alice).unwrap();
        state.node.process_transaction(tx.clone()).await.unwrap();
        state
            .node
            .produce_block(&SingleValidator::new(KeyPair::generate()))
            .await
            .unwrap();

        let found = get_transaction(State(state.clone()), Path(tx.hash().to_hex()))
            .await
            .unwrap();
        assert_eq!(found.0, tx);

        let balance = get_balance(State(state.clone()), Path(alice.address().to_string()))
            .await
            .unwrap();
        assert_eq!(balance.balance, 60);

        let (status, _) = get_transaction(State(state), Path(Hash::random().to_hex()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_transaction_rejects_unsigned() {
        let (_node, state) = setup(&KeyPair::generate()).await;
        let tx = Transaction::transfer(KeyPair::generate().public_key(), 1);

        let (status, body) = post_transaction(State(state), Json(tx)).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("not signed"));
    }

    #[tokio::test]
    async fn test_post_transaction_queues_submission() {
        let alice = KeyPair::generate();
        let (node, state) = setup(&alice).await;
        let handle = node.handle();
        tokio::spawn(node.start());

        let mut tx = Transaction::transfer(KeyPair::generate().public_key(), 1);
        tx.sign(&alice).unwrap();
        let response = post_transaction(State(state), Json(tx.clone()))
            .await
            .unwrap();
        assert_eq!(response.hash, tx.hash());

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !handle.mempool().contains(&tx.hash()).await {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        handle.shutdown().await;
    }
}
