use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use super::{PeerRecord, PeerStore, StoreError};
use crate::info_hash::InfoHash;

/// Peer records persisted as one JSON object keyed by lowercase hex info hash.
///
/// Every access re-reads the file and reparses it when the bytes differ from
/// the last ones seen, so a server process sees records written by a separate
/// harvest run. Timestamps are not trusted for this: two writes can land on
/// the same mtime tick.
#[derive(Debug)]
pub struct JsonFilePeerStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Debug, Default)]
struct FileState {
    records: HashMap<InfoHash, PeerRecord>,
    contents: Vec<u8>,
}

impl JsonFilePeerStore {
    /// Opens the store at `path`, creating an empty one if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if fs::metadata(&path).await.is_err() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await.map_err(|e| io_error(&path, e))?;
            }
            write_records(&path, &HashMap::new()).await?;
        }

        let store = Self {
            path,
            state: Mutex::new(FileState::default()),
        };
        {
            let mut state = store.state.lock().await;
            let data = fs::read(&store.path).await.map_err(|e| io_error(&store.path, e))?;
            state.records = parse_records(&store.path, &data)?;
            state.contents = data;
        }
        tracing::info!("Opened peer store {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn reload_if_changed(&self, state: &mut FileState) -> Result<(), StoreError> {
        let data = fs::read(&self.path).await.map_err(|e| io_error(&self.path, e))?;
        if data != state.contents {
            tracing::debug!("Peer store {} changed on disk, reloading", self.path.display());
            state.records = parse_records(&self.path, &data)?;
            state.contents = data;
        }
        Ok(())
    }
}

#[async_trait]
impl PeerStore for JsonFilePeerStore {
    async fn upsert(&self, record: PeerRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        self.reload_if_changed(&mut state).await?;

        state.records.insert(record.info_hash, record);
        state.contents = write_records(&self.path, &state.records).await?;
        Ok(())
    }

    async fn get(&self, info_hash: &InfoHash) -> Result<Option<PeerRecord>, StoreError> {
        let mut state = self.state.lock().await;
        self.reload_if_changed(&mut state).await?;
        Ok(state.records.get(info_hash).cloned())
    }
}

fn parse_records(path: &Path, data: &[u8]) -> Result<HashMap<InfoHash, PeerRecord>, StoreError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(HashMap::new());
    }

    let by_key: BTreeMap<String, PeerRecord> =
        serde_json::from_slice(data).map_err(|source| StoreError::Serialization {
            path: path.to_path_buf(),
            source,
        })?;

    by_key
        .into_iter()
        .map(|(key, record)| {
            if key != record.info_hash.to_hex() {
                return Err(StoreError::InvalidKey {
                    key,
                    record: record.info_hash.to_hex(),
                });
            }
            Ok((record.info_hash, record))
        })
        .collect()
}

/// Writes through a temp file and rename, returning the bytes written.
async fn write_records(
    path: &Path,
    records: &HashMap<InfoHash, PeerRecord>,
) -> Result<Vec<u8>, StoreError> {
    let by_key: BTreeMap<String, &PeerRecord> = records
        .iter()
        .map(|(hash, record)| (hash.to_hex(), record))
        .collect();
    let json = serde_json::to_vec_pretty(&by_key).map_err(|source| StoreError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, &json).await.map_err(|e| io_error(&tmp, e))?;
    fs::rename(&tmp, path).await.map_err(|e| io_error(path, e))?;
    Ok(json)
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}
