// In-memory implementation of the fingerprint store. The gate's contract
// tolerates a non-durable set (duplicates simply reappear after a restart),
// so this is the store tests run against.

use crate::core::dedup::{Fingerprint, FingerprintStore, GateError};
use async_trait::async_trait;
use dashmap::DashSet;

pub struct InMemoryFingerprintStore {
    seen: DashSet<Fingerprint>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }
}

impl Default for InMemoryFingerprintStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn contains(&self, fingerprint: &Fingerprint) -> Result<bool, GateError> {
        Ok(self.seen.contains(fingerprint))
    }

    async fn insert(&self, fingerprint: &Fingerprint) -> Result<(), GateError> {
        self.seen.insert(*fingerprint);
        Ok(())
    }

    async fn len(&self) -> Result<u64, GateError> {
        Ok(self.seen.len() as u64)
    }
}
