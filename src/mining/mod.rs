//! Block production and transaction pooling

pub mod mempool;
pub mod producer;

pub use mempool::{Mempool, MempoolError, DEFAULT_MEMPOOL_CAPACITY};
pub use producer::{BlockProducer, SingleValidator};
