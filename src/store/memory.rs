use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PeerRecord, PeerStore, StoreError};
use crate::info_hash::InfoHash;

#[derive(Debug, Default)]
pub struct MemoryPeerStore {
    records: RwLock<HashMap<InfoHash, PeerRecord>>,
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeerStore for MemoryPeerStore {
    async fn upsert(&self, record: PeerRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.info_hash, record);
        Ok(())
    }

    async fn get(&self, info_hash: &InfoHash) -> Result<Option<PeerRecord>, StoreError> {
        Ok(self.records.read().await.get(info_hash).cloned())
    }
}
