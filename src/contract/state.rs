//! Contract key/value state

use std::collections::HashMap;

/// Key/value store written by contract execution
///
/// The ledger clones it as a scratch copy per transaction and keeps the copy
/// only if the whole transaction applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    data: HashMap<Vec<u8>, Vec<u8>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.data.insert(key, value);
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    pub fn delete(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.remove(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
