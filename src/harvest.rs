//! Collects peers for local torrents from their trackers and republishes the
//! torrents against our own announce endpoint.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

use crate::server::SharedStore;
use crate::store::PeerRecord;
use crate::torrent_file::TorrentFile;
use crate::tracker::{factory, TrackerClient};

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Failed to read torrent directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HarvestReport {
    pub torrents: usize,
    pub failed_torrents: usize,
    pub trackers_contacted: usize,
    pub trackers_skipped: usize,
    pub records_written: usize,
}

impl HarvestReport {
    fn merge(&mut self, other: HarvestReport) {
        self.torrents += other.torrents;
        self.failed_torrents += other.failed_torrents;
        self.trackers_contacted += other.trackers_contacted;
        self.trackers_skipped += other.trackers_skipped;
        self.records_written += other.records_written;
    }
}

pub struct Harvester {
    client: TrackerClient,
    store: SharedStore,
}

impl Harvester {
    pub fn new(client: TrackerClient, store: SharedStore) -> Self {
        Self { client, store }
    }

    /// Contacts the torrent's trackers one at a time, in announce-list order.
    ///
    /// Each tracker that returns peers is scraped and then overwrites the
    /// stored record, so the last successful tracker wins.
    pub async fn harvest_torrent(&self, torrent: &TorrentFile) -> HarvestReport {
        let mut report = HarvestReport {
            torrents: 1,
            ..HarvestReport::default()
        };
        tracing::info!("Harvesting {}", torrent);

        for url in &torrent.announce_urls {
            if !factory::is_supported(url) {
                tracing::debug!("Skipping tracker {}", url);
                report.trackers_skipped += 1;
                continue;
            }
            tracing::info!("Processing tracker {}", url);
            report.trackers_contacted += 1;

            let request = self.client.started_request(torrent.info_hash);
            let peers = self.client.announce(url, &request).await;
            if peers.is_empty() {
                tracing::info!("No peers to store for {} from {}", torrent.info_hash, url);
                continue;
            }

            let scrape = self.client.scrape(url, &torrent.info_hash).await;
            let record = PeerRecord {
                info_hash: torrent.info_hash,
                peers,
                source_label: torrent.source_label.clone(),
                scrape,
            };
            let peer_count = record.peers.len();
            match self.store.upsert(record).await {
                Ok(()) => {
                    tracing::info!(
                        "Stored {} peers for {} from {}",
                        peer_count,
                        torrent.info_hash,
                        url
                    );
                    report.records_written += 1;
                }
                Err(e) => tracing::warn!("Failed to store peers for {}: {}", torrent.info_hash, e),
            }
        }
        report
    }

    /// Harvests every `*.torrent` in `torrents_dir` by name order and writes a
    /// copy announcing to `announce_url` into `modified_dir`.
    pub async fn harvest_directory(
        &self,
        torrents_dir: &Path,
        modified_dir: &Path,
        announce_url: &str,
    ) -> Result<HarvestReport, HarvestError> {
        let paths = torrent_paths(torrents_dir).await?;
        tracing::info!(
            "Found {} torrent files in {}",
            paths.len(),
            torrents_dir.display()
        );

        let mut report = HarvestReport::default();
        for path in paths {
            let torrent = match TorrentFile::load(&path).await {
                Ok(torrent) => torrent,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    report.failed_torrents += 1;
                    continue;
                }
            };

            report.merge(self.harvest_torrent(&torrent).await);

            if let Err(e) = write_modified(&torrent, modified_dir, announce_url).await {
                tracing::warn!("Failed to write modified {}: {}", torrent.source_label, e);
                report.failed_torrents += 1;
            }
        }
        Ok(report)
    }
}

async fn torrent_paths(dir: &Path) -> Result<Vec<PathBuf>, HarvestError> {
    let read_dir_error = |source| HarvestError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir).await.map_err(read_dir_error)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_error)? {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "torrent") {
            continue;
        }
        // Follows symlinks, unlike `DirEntry::file_type`.
        if fs::metadata(&path).await.is_ok_and(|meta| meta.is_file()) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

async fn write_modified(
    torrent: &TorrentFile,
    modified_dir: &Path,
    announce_url: &str,
) -> std::io::Result<()> {
    fs::create_dir_all(modified_dir).await?;
    let path = modified_dir.join(&torrent.source_label);
    fs::write(&path, torrent.with_announce(announce_url)).await?;
    tracing::info!("Modified torrent saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;

    use super::*;
    use crate::bencode_parser::{bencode_encode, decode, BencodeValue};
    use crate::config::ClientConfig;
    use crate::info_hash::InfoHash;
    use crate::peer::Peer;
    use crate::server;
    use crate::store::{MemoryPeerStore, PeerStore, ScrapeData};

    fn dict(entries: Vec<(&str, BencodeValue)>) -> BencodeValue {
        BencodeValue::Dictionary(
            entries
                .into_iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn torrent_bytes(urls: &[&str]) -> Vec<u8> {
        let tiers = urls
            .iter()
            .map(|url| BencodeValue::List(vec![(*url).into()]))
            .collect();
        bencode_encode(&dict(vec![
            ("announce", urls[0].into()),
            ("announce-list", BencodeValue::List(tiers)),
            (
                "info",
                dict(vec![
                    ("length", BencodeValue::Integer(12)),
                    ("name", "test".into()),
                    ("piece length", BencodeValue::Integer(16384)),
                    ("pieces", BencodeValue::ByteString(vec![0; 20])),
                ]),
            ),
        ]))
    }

    fn harvester(store: SharedStore) -> Harvester {
        let client = TrackerClient::new(&ClientConfig {
            timeout_secs: 2,
            ..ClientConfig::default()
        })
        .unwrap();
        Harvester::new(client, store)
    }

    async fn spawn(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/announce")
    }

    /// Runs our own announce server as an upstream tracker holding `peers`.
    async fn spawn_upstream(info_hash: InfoHash, peers: Vec<Peer>) -> String {
        let store = MemoryPeerStore::new();
        store
            .upsert(PeerRecord {
                info_hash,
                peers,
                source_label: "upstream".to_string(),
                scrape: None,
            })
            .await
            .unwrap();
        spawn(server::router(Arc::new(store))).await
    }

    fn sample_torrent(urls: &[&str]) -> TorrentFile {
        TorrentFile::from_bencoded(&torrent_bytes(urls), "sample.torrent").unwrap()
    }

    #[tokio::test]
    async fn test_harvest_skips_udp_and_stores_http_peers() {
        let info_hash = sample_torrent(&["http://unused/announce"]).info_hash;
        let peers = vec![
            Peer::new(Ipv4Addr::new(10, 0, 0, 1), 51413),
            Peer::new(Ipv4Addr::new(10, 0, 0, 2), 6881),
        ];
        let upstream = spawn_upstream(info_hash, peers.clone()).await;
        let torrent = sample_torrent(&["udp://tracker.invalid:1337/announce", upstream.as_str()]);

        let store = Arc::new(MemoryPeerStore::new());
        let report = harvester(store.clone()).harvest_torrent(&torrent).await;

        assert_eq!(report.trackers_skipped, 1);
        assert_eq!(report.trackers_contacted, 1);
        assert_eq!(report.records_written, 1);

        let record = store.get(&info_hash).await.unwrap().unwrap();
        assert_eq!(record.peers, peers);
        assert_eq!(record.source_label, "sample.torrent");
        // The announce server has no scrape endpoint, so nothing is recorded.
        assert_eq!(record.scrape, None);
    }

    #[tokio::test]
    async fn test_later_tracker_overwrites_earlier_record() {
        let info_hash = sample_torrent(&["http://unused/announce"]).info_hash;
        let first_peers = vec![Peer::new(Ipv4Addr::new(10, 0, 0, 1), 1)];
        let second_peers = vec![Peer::new(Ipv4Addr::new(10, 0, 0, 2), 2)];
        let first = spawn_upstream(info_hash, first_peers).await;
        let second = spawn_upstream(info_hash, second_peers.clone()).await;
        let empty = spawn_upstream(InfoHash::new([0; 20]), Vec::new()).await;

        let torrent = sample_torrent(&[first.as_str(), second.as_str(), empty.as_str()]);
        let store = Arc::new(MemoryPeerStore::new());
        let report = harvester(store.clone()).harvest_torrent(&torrent).await;

        assert_eq!(report.trackers_contacted, 3);
        assert_eq!(report.records_written, 2);
        assert_eq!(store.get(&info_hash).await.unwrap().unwrap().peers, second_peers);
    }

    #[tokio::test]
    async fn test_scrape_data_is_stored_with_peers() {
        let info_hash = sample_torrent(&["http://unused/announce"]).info_hash;
        let peers = vec![Peer::new(Ipv4Addr::new(192, 168, 1, 1), 6881)];
        let announce_body = server::announce_body(&peers);
        let scrape_body = format!(
            "d5:filesd40:{}d8:completei7e10:downloadedi42e10:incompletei3eeee",
            info_hash.to_hex()
        );
        let router = Router::new()
            .route("/announce", get(move || async move { announce_body }))
            .route("/scrape", get(move || async move { scrape_body }));
        let upstream = spawn(router).await;

        let store = Arc::new(MemoryPeerStore::new());
        harvester(store.clone())
            .harvest_torrent(&sample_torrent(&[upstream.as_str()]))
            .await;

        let record = store.get(&info_hash).await.unwrap().unwrap();
        assert_eq!(record.peers, peers);
        assert_eq!(
            record.scrape,
            Some(ScrapeData {
                complete: 7,
                incomplete: 3,
                downloaded: 42
            })
        );
    }

    #[tokio::test]
    async fn test_harvest_directory_rewrites_torrents() {
        let dir = tempfile::tempdir().unwrap();
        let torrents = dir.path().join("torrents");
        let modified = dir.path().join("modified");
        std::fs::create_dir(&torrents).unwrap();

        let good = torrent_bytes(&["udp://tracker.invalid:1337/announce"]);
        std::fs::write(torrents.join("good.torrent"), &good).unwrap();
        std::fs::write(torrents.join("broken.torrent"), b"not bencode").unwrap();
        std::fs::write(torrents.join("notes.txt"), b"ignored").unwrap();
        std::fs::create_dir(torrents.join("folder.torrent")).unwrap();

        let store = Arc::new(MemoryPeerStore::new());
        let report = harvester(store)
            .harvest_directory(&torrents, &modified, "http://localhost:8000/announce")
            .await
            .unwrap();

        assert_eq!(report.torrents, 1);
        assert_eq!(report.failed_torrents, 1);
        assert_eq!(report.trackers_skipped, 1);

        let rewritten = std::fs::read(modified.join("good.torrent")).unwrap();
        let value = decode(&rewritten).unwrap();
        assert_eq!(value.get(b"announce-list"), None);
        assert_eq!(
            value.get(b"announce").and_then(BencodeValue::as_bytes),
            Some(&b"http://localhost:8000/announce"[..])
        );
        assert!(!modified.join("broken.torrent").exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = harvester(Arc::new(MemoryPeerStore::new()))
            .harvest_directory(
                &dir.path().join("absent"),
                &dir.path().join("modified"),
                "http://localhost:8000/announce",
            )
            .await;
        assert!(matches!(result, Err(HarvestError::ReadDir { .. })));
    }
}
