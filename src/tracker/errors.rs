use thiserror::Error;

use crate::bencode_parser::BencodeError;
use crate::peer::CompactPeerError;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Tracker request timed out")]
    Timeout,

    #[error("Tracker returned HTTP status {0}")]
    Status(u16),

    #[error("Tracker failure: {0}")]
    Failure(String),

    #[error("Malformed tracker response: {0}")]
    Parse(#[from] BencodeError),

    #[error("Malformed compact peer list: {0}")]
    Format(#[from] CompactPeerError),

    #[error("Unexpected tracker response: {0}")]
    InvalidResponse(&'static str),

    #[error("Tracker response exceeds {0} bytes")]
    TooLarge(usize),
}

impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TrackerError::Timeout
        } else {
            TrackerError::Http(e)
        }
    }
}
