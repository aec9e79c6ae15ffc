//! REST API module
//!
//! Read-only chain queries plus transaction submission.
//!
//! # Endpoints
//! - `GET /block/{id}` - Block by height, or by hex hash
//! - `GET /tx/{hash}` - Applied transaction by hash
//! - `POST /tx` - Submit a signed JSON transaction
//! - `GET /account/{address}` - Account balance
//! - `GET /status` - Node status
//! - `GET /health` - Health check

pub mod handlers;
pub mod routes;

pub use handlers::{ApiError, ApiState, BlockView};
pub use routes::{create_router, serve};
