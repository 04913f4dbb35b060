use std::net::Ipv4Addr;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{AnnounceRequest, Tracker, TrackerError};
use crate::bencode_parser::{decode, BencodeValue};
use crate::info_hash::InfoHash;
use crate::peer::{decode_compact, Peer};
use crate::percent;
use crate::store::ScrapeData;

/// Upper bound on an announce or scrape body read from a tracker.
pub const MAX_RESPONSE_BYTES: usize = 1 << 20;

pub struct HttpTracker {
    announce_url: Url,
    client: Client,
}

impl HttpTracker {
    pub fn new(mut announce_url: Url, client: Client) -> Self {
        announce_url.set_fragment(None);
        Self {
            announce_url,
            client,
        }
    }

    /// Announce URL with the binary fields escaped byte by byte.
    ///
    /// The query is assembled by hand since `Url`'s serializer would re-escape
    /// the `%` of already encoded bytes.
    pub(crate) fn build_announce_url(&self, request: &AnnounceRequest) -> String {
        let mut query = format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            percent::encode_bytes(request.info_hash.as_bytes()),
            percent::encode_bytes(&request.peer_id),
            request.port,
            request.uploaded,
            request.downloaded,
            request.left,
        );
        if let Some(event) = request.event.as_str() {
            query.push_str("&event=");
            query.push_str(event);
        }
        append_query(&self.announce_url, &query)
    }

    /// BEP 48: the last path segment must start with `announce`, which becomes `scrape`.
    pub(crate) fn scrape_url(&self) -> Option<Url> {
        let path = self.announce_url.path();
        let (head, last) = path.rsplit_once('/')?;
        let suffix = last.strip_prefix("announce")?;

        let mut scrape = self.announce_url.clone();
        scrape.set_path(&format!("{head}/scrape{suffix}"));
        Some(scrape)
    }

    pub(crate) fn build_scrape_url(&self, info_hash: &InfoHash) -> Option<String> {
        let scrape = self.scrape_url()?;
        let query = format!("info_hash={}", percent::encode_bytes(info_hash.as_bytes()));
        Some(append_query(&scrape, &query))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TrackerError> {
        tracing::debug!("GET {}", url);
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Status(status.as_u16()));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
        {
            return Err(TrackerError::TooLarge(MAX_RESPONSE_BYTES));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(TrackerError::TooLarge(MAX_RESPONSE_BYTES));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl Tracker for HttpTracker {
    async fn announce(&self, request: &AnnounceRequest) -> Result<Vec<Peer>, TrackerError> {
        let body = self.fetch(&self.build_announce_url(request)).await?;
        parse_announce_response(&body)
    }

    async fn scrape(&self, info_hash: &InfoHash) -> Result<Option<ScrapeData>, TrackerError> {
        let Some(url) = self.build_scrape_url(info_hash) else {
            tracing::debug!("Tracker {} has no scrape endpoint", self.announce_url);
            return Ok(None);
        };
        let body = self.fetch(&url).await?;
        parse_scrape_response(&body, info_hash)
    }

    fn url(&self) -> &str {
        self.announce_url.as_str()
    }
}

fn append_query(base: &Url, query: &str) -> String {
    let separator = match base.query() {
        Some(existing) if !existing.is_empty() => '&',
        Some(_) => return format!("{}{}", base, query),
        None => '?',
    };
    format!("{}{}{}", base, separator, query)
}

fn response_dict(body: &[u8]) -> Result<BencodeValue, TrackerError> {
    let value = decode(body)?;
    if value.as_dict().is_none() {
        return Err(TrackerError::InvalidResponse("not a dictionary"));
    }
    if let Some(reason) = value.get(b"failure reason").and_then(BencodeValue::as_bytes) {
        return Err(TrackerError::Failure(
            String::from_utf8_lossy(reason).into_owned(),
        ));
    }
    Ok(value)
}

pub(crate) fn parse_announce_response(body: &[u8]) -> Result<Vec<Peer>, TrackerError> {
    let response = response_dict(body)?;

    match response.get(b"peers") {
        Some(BencodeValue::ByteString(compact)) => Ok(decode_compact(compact)?),
        Some(BencodeValue::List(peer_list)) => {
            // Non-compact response
            Ok(peer_list.iter().filter_map(parse_peer_dict).collect())
        }
        Some(_) => Err(TrackerError::InvalidResponse("peers has an unexpected type")),
        None => Ok(Vec::new()),
    }
}

fn parse_peer_dict(peer: &BencodeValue) -> Option<Peer> {
    let ip = peer
        .get(b"ip")
        .and_then(BencodeValue::as_bytes)
        .and_then(|ip| std::str::from_utf8(ip).ok())
        .and_then(|ip| ip.parse::<Ipv4Addr>().ok())?;
    let port = peer
        .get(b"port")
        .and_then(BencodeValue::as_int)
        .and_then(|port| u16::try_from(port).ok())?;
    Some(Peer { ip, port })
}

/// Finds the entry for `info_hash` in `files`, keyed by raw bytes or by lowercase hex.
pub(crate) fn parse_scrape_response(
    body: &[u8],
    info_hash: &InfoHash,
) -> Result<Option<ScrapeData>, TrackerError> {
    let response = response_dict(body)?;
    let Some(files) = response.get(b"files") else {
        return Ok(None);
    };

    let entry = files
        .get(info_hash.as_bytes())
        .or_else(|| files.get(info_hash.to_hex().as_bytes()));
    let Some(entry) = entry else {
        return Ok(None);
    };

    Ok(Some(ScrapeData {
        complete: counter(entry, b"complete"),
        incomplete: counter(entry, b"incomplete"),
        downloaded: counter(entry, b"downloaded"),
    }))
}

fn counter(entry: &BencodeValue, key: &[u8]) -> u64 {
    entry
        .get(key)
        .and_then(BencodeValue::as_int)
        .map_or(0, |n| n.max(0) as u64)
}
