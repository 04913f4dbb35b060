mod errors;
mod file;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::info_hash::InfoHash;
use crate::peer::Peer;

pub use errors::StoreError;
pub use file::JsonFilePeerStore;
pub use memory::MemoryPeerStore;

/// Swarm counters reported by a tracker's scrape endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrapeData {
    pub complete: u64,
    pub incomplete: u64,
    pub downloaded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub info_hash: InfoHash,
    #[serde(default)]
    pub peers: Vec<Peer>,
    /// File name of the torrent the peers were harvested for.
    pub source_label: String,
    #[serde(default)]
    pub scrape: Option<ScrapeData>,
}

/// Keyed persistence for peer records. One record per info hash.
#[async_trait]
pub trait PeerStore: Send + Sync {
    /// Replaces the whole record stored under `record.info_hash`.
    async fn upsert(&self, record: PeerRecord) -> Result<(), StoreError>;

    async fn get(&self, info_hash: &InfoHash) -> Result<Option<PeerRecord>, StoreError>;
}
