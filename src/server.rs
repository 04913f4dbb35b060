//! HTTP announce endpoint serving stored peer lists in compact form.
//!
//! Every protocol-level problem (unknown hash, malformed `info_hash`, store
//! failure) still yields `200` with an empty peer list, which is what
//! downstream clients expect from this tracker.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::bencode_parser::{bencode_encode, BencodeValue};
use crate::info_hash::InfoHash;
use crate::peer::{encode_compact, Peer};
use crate::percent;
use crate::store::PeerStore;

pub const ANNOUNCE_INTERVAL: i64 = 1800;

pub type SharedStore = Arc<dyn PeerStore>;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/announce", get(announce))
        .fallback(unknown_path)
        .with_state(store)
}

pub async fn serve(bind: SocketAddr, store: SharedStore) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!("Announce server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(store)).await
}

async fn announce(
    State(store): State<SharedStore>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let peers = match query.as_deref().and_then(info_hash_param) {
        Some(info_hash) => lookup_peers(store.as_ref(), &info_hash).await,
        None => {
            tracing::debug!("Announce without a usable info_hash: {:?}", query);
            Vec::new()
        }
    };

    (
        [(header::CONTENT_TYPE, "text/plain")],
        announce_body(&peers),
    )
}

async fn unknown_path(uri: axum::http::Uri) -> impl IntoResponse {
    tracing::debug!("Request for unknown path {}", uri.path());
    ""
}

async fn lookup_peers(store: &dyn PeerStore, info_hash: &InfoHash) -> Vec<Peer> {
    match store.get(info_hash).await {
        Ok(Some(record)) => {
            tracing::info!(
                "Serving {} peers for {} ({})",
                record.peers.len(),
                info_hash,
                record.source_label
            );
            record.peers
        }
        Ok(None) => {
            tracing::info!("No peers stored for {}", info_hash);
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("Peer store lookup for {} failed: {}", info_hash, e);
            Vec::new()
        }
    }
}

/// Extracts the first `info_hash` from a raw query string as 20 raw bytes.
fn info_hash_param(query: &str) -> Option<InfoHash> {
    let raw = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("info_hash="))?;
    InfoHash::try_from(percent::decode_bytes(raw).as_slice()).ok()
}

pub fn announce_body(peers: &[Peer]) -> Vec<u8> {
    let mut response = BTreeMap::new();
    response.insert(b"interval".to_vec(), BencodeValue::Integer(ANNOUNCE_INTERVAL));
    response.insert(
        b"peers".to_vec(),
        BencodeValue::ByteString(encode_compact(peers)),
    );
    bencode_encode(&BencodeValue::Dictionary(response))
}
