use url::Url;

use super::{http::HttpTracker, Tracker};

/// Builds a tracker for `announce_url`, or `None` when its scheme is not HTTP(S).
///
/// No connection is made here, so UDP and unparsable URLs cost nothing.
pub fn create_tracker(announce_url: &str, client: &reqwest::Client) -> Option<Box<dyn Tracker>> {
    let url = match Url::parse(announce_url) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("Invalid tracker URL {}: {}", announce_url, e);
            return None;
        }
    };
    match url.scheme() {
        "http" | "https" => Some(Box::new(HttpTracker::new(url, client.clone()))),
        _ => None,
    }
}

pub fn is_supported(announce_url: &str) -> bool {
    Url::parse(announce_url).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}
