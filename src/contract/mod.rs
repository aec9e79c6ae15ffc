//! Contract execution
//!
//! Transactions carrying `data` have it executed as bytecode against the
//! ledger's contract state.

pub mod opcodes;
pub mod state;
pub mod vm;

pub use opcodes::OpCode;
pub use state::State;
pub use vm::{asm, decode_int, Value, VmError, STACK_CAPACITY, VM};
