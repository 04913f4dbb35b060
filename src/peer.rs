use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const COMPACT_PEER_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompactPeerError {
    #[error("Compact peer data length {0} is not a multiple of 6")]
    InvalidLength(usize),
}

/// Encodes peers as 4 IPv4 octets followed by a big-endian port, in order.
pub fn encode_compact(peers: &[Peer]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(peers.len() * COMPACT_PEER_LEN);
    for peer in peers {
        buf.extend_from_slice(&peer.ip.octets());
        buf.extend_from_slice(&peer.port.to_be_bytes());
    }
    buf
}

pub fn decode_compact(bytes: &[u8]) -> Result<Vec<Peer>, CompactPeerError> {
    if bytes.len() % COMPACT_PEER_LEN != 0 {
        return Err(CompactPeerError::InvalidLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| Peer {
            ip: Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]),
            port: u16::from_be_bytes([chunk[4], chunk[5]]),
        })
        .collect())
}
