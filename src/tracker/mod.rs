mod errors;
pub mod factory;
mod http;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::config::ClientConfig;
use crate::info_hash::InfoHash;
use crate::peer::Peer;
use crate::store::ScrapeData;

pub use errors::TrackerError;
pub use http::HttpTracker;

pub const PEER_ID_PREFIX: &[u8; 8] = b"-MT0001-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    Started,
    Stopped,
    Completed,
    /// Regular interval announce; no `event` parameter is sent.
    None,
}

impl AnnounceEvent {
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            AnnounceEvent::Started => Some("started"),
            AnnounceEvent::Stopped => Some("stopped"),
            AnnounceEvent::Completed => Some("completed"),
            AnnounceEvent::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub info_hash: InfoHash,
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: AnnounceEvent,
}

#[async_trait]
pub trait Tracker: Send + Sync {
    async fn announce(&self, request: &AnnounceRequest) -> Result<Vec<Peer>, TrackerError>;

    /// `Ok(None)` when the tracker has no scrape endpoint or no entry for the hash.
    async fn scrape(&self, info_hash: &InfoHash) -> Result<Option<ScrapeData>, TrackerError>;

    fn url(&self) -> &str;
}

pub fn generate_peer_id() -> [u8; 20] {
    let mut bytes = [0u8; 20];
    bytes[..8].copy_from_slice(PEER_ID_PREFIX);
    let mut rng = rand::thread_rng();
    for b in &mut bytes[8..] {
        *b = rng.sample(Alphanumeric);
    }
    bytes
}

/// Talks to arbitrary tracker URLs and never fails.
///
/// Network, timeout and decoding errors are logged and turned into an empty
/// peer list or a missing scrape result. URLs with a scheme other than
/// `http`/`https` are ignored without opening a connection.
pub struct TrackerClient {
    http: reqwest::Client,
    peer_id: [u8; 20],
    port: u16,
}

impl TrackerClient {
    pub fn new(config: &ClientConfig) -> Result<Self, TrackerError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()?;

        Ok(Self {
            http,
            peer_id: generate_peer_id(),
            port: config.port,
        })
    }

    pub fn peer_id(&self) -> &[u8; 20] {
        &self.peer_id
    }

    /// A `started` announce that reports nothing transferred and nothing left.
    pub fn started_request(&self, info_hash: InfoHash) -> AnnounceRequest {
        AnnounceRequest {
            info_hash,
            peer_id: self.peer_id,
            port: self.port,
            uploaded: 0,
            downloaded: 0,
            left: 0,
            event: AnnounceEvent::Started,
        }
    }

    pub async fn announce(&self, tracker_url: &str, request: &AnnounceRequest) -> Vec<Peer> {
        let Some(tracker) = factory::create_tracker(tracker_url, &self.http) else {
            tracing::debug!("Ignoring unsupported tracker {}", tracker_url);
            return Vec::new();
        };

        match tracker.announce(request).await {
            Ok(peers) => {
                tracing::debug!("Tracker {} returned {} peers", tracker.url(), peers.len());
                peers
            }
            Err(e) => {
                tracing::warn!("Announce to {} failed: {}", tracker.url(), e);
                Vec::new()
            }
        }
    }

    pub async fn scrape(&self, tracker_url: &str, info_hash: &InfoHash) -> Option<ScrapeData> {
        let tracker = factory::create_tracker(tracker_url, &self.http)?;

        match tracker.scrape(info_hash).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Scrape of {} failed: {}", tracker.url(), e);
                None
            }
        }
    }
}
