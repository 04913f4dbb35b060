use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bencode_parser::{bencode_encode, parse_bencode, BencodeError, BencodeValue};
use crate::info_hash::InfoHash;

#[derive(Error, Debug)]
pub enum TorrentError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid bencode: {0}")]
    Bencode(#[from] BencodeError),

    #[error("Torrent file is not a dictionary")]
    NotADictionary,

    #[error("Missing or invalid info dictionary")]
    MissingInfo,

    #[error("Torrent file has more than one info dictionary")]
    DuplicateInfo,
}

#[derive(Debug, Clone)]
pub struct TorrentFile {
    /// File name the torrent was loaded from.
    pub source_label: String,
    pub info_hash: InfoHash,
    pub announce_urls: Vec<String>,
    root: BTreeMap<Vec<u8>, BencodeValue>,
    raw_info: Vec<u8>,
}

impl TorrentFile {
    pub async fn load(path: &Path) -> Result<Self, TorrentError> {
        let data = tokio::fs::read(path).await.map_err(|source| TorrentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_bencoded(&data, label)
    }

    pub fn from_bencoded(
        data: &[u8],
        source_label: impl Into<String>,
    ) -> Result<Self, TorrentError> {
        let root = match parse_bencode(data)?.0 {
            BencodeValue::Dictionary(dict) => dict,
            _ => return Err(TorrentError::NotADictionary),
        };
        // Hash the info bytes as they appear in the file, before anything is rewritten.
        let raw_info = info_span(data)?.to_vec();
        if !matches!(root.get(&b"info"[..]), Some(BencodeValue::Dictionary(_))) {
            return Err(TorrentError::MissingInfo);
        }
        let info_hash = InfoHash::from_info_bytes(&raw_info);
        let announce_urls = collect_announce_urls(&root);

        Ok(Self {
            source_label: source_label.into(),
            info_hash,
            announce_urls,
            root,
            raw_info,
        })
    }

    pub fn name(&self) -> Option<String> {
        self.root
            .get(&b"info"[..])
            .and_then(|info| info.get(b"name"))
            .and_then(BencodeValue::as_bytes)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Re-encodes the torrent announcing only to `announce_url`.
    ///
    /// `announce-list` is dropped. The info dictionary is written back byte for
    /// byte so the info hash of the output matches [`TorrentFile::info_hash`].
    pub fn with_announce(&self, announce_url: &str) -> Vec<u8> {
        let mut dict = self.root.clone();
        dict.remove(&b"announce-list"[..]);
        dict.insert(b"announce".to_vec(), announce_url.into());

        let mut out = vec![b'd'];
        for (key, value) in &dict {
            out.extend(bencode_encode(&BencodeValue::ByteString(key.clone())));
            if key == b"info" {
                out.extend_from_slice(&self.raw_info);
            } else {
                out.extend(bencode_encode(value));
            }
        }
        out.push(b'e');
        out
    }
}

impl fmt::Display for TorrentFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (name: {}, info hash: {}, trackers: {})",
            self.source_label,
            self.name().unwrap_or_default(),
            self.info_hash,
            self.announce_urls.len()
        )
    }
}

/// Locates the raw bytes of the single top-level `info` dictionary.
fn info_span(data: &[u8]) -> Result<&[u8], TorrentError> {
    let mut rest = data.strip_prefix(b"d").ok_or(TorrentError::NotADictionary)?;
    let mut span = None;
    while !rest.is_empty() && rest[0] != b'e' {
        let (key, after_key) = parse_bencode(rest)?;
        let (_, after_value) = parse_bencode(after_key)?;
        if key.as_bytes() == Some(&b"info"[..]) {
            if span.is_some() {
                return Err(TorrentError::DuplicateInfo);
            }
            span = Some(&after_key[..after_key.len() - after_value.len()]);
        }
        rest = after_value;
    }
    match span {
        Some(info) if info.starts_with(b"d") => Ok(info),
        _ => Err(TorrentError::MissingInfo),
    }
}

/// Flattened `announce-list` tiers in order, or `announce` when there is no list.
fn collect_announce_urls(root: &BTreeMap<Vec<u8>, BencodeValue>) -> Vec<String> {
    let from_list: Vec<&[u8]> = root
        .get(&b"announce-list"[..])
        .and_then(BencodeValue::as_list)
        .unwrap_or_default()
        .iter()
        .flat_map(|tier| match tier {
            BencodeValue::List(urls) => urls.iter().filter_map(BencodeValue::as_bytes).collect(),
            BencodeValue::ByteString(url) => vec![url.as_slice()],
            _ => Vec::new(),
        })
        .collect();

    let candidates = if from_list.is_empty() {
        root.get(&b"announce"[..])
            .and_then(BencodeValue::as_bytes)
            .into_iter()
            .collect()
    } else {
        from_list
    };

    let mut urls: Vec<String> = Vec::new();
    for raw in candidates {
        match std::str::from_utf8(raw) {
            Ok(url) if !url.is_empty() && !urls.iter().any(|u| u == url) => {
                urls.push(url.to_string())
            }
            Ok(_) => {}
            Err(_) => tracing::debug!("Skipping non UTF-8 announce URL"),
        }
    }
    urls
}
