//! Cryptographic utilities for the blockchain
//!
//! This module provides:
//! - SHA-256 hashing
//! - ECDSA key management (secp256k1)
//! - Address derivation

pub mod hash;
pub mod keys;

pub use hash::{hex_bytes, sha256, sha256_hex, Hash, HashParseError, HASH_LEN};
pub use keys::{Address, KeyError, KeyPair, PublicKey, Signature, ADDRESS_LEN, SIGNATURE_LEN};
