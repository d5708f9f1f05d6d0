//! Request identity used to key cache entries.

use sha2::{Digest, Sha256};
use url::Url;

use crate::http::{Request, Response};

/// Request headers recorded at store time for the names listed in `Vary`.
pub type VarySnapshot = Vec<(String, Option<String>)>;

/// URL used as the entry identity. The fragment never reaches the server, so it is dropped.
pub fn cache_url(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.to_string()
}

/// Stable fixed-length key for an entry URL.
pub fn url_hash(url: &Url) -> String {
  let mut hasher = Sha256::new();
  hasher.update(cache_url(url).as_bytes());
  hex::encode(hasher.finalize())
}

/// Capture the request header values named by the response's `Vary` header.
pub fn vary_snapshot(request: &Request, response: &Response) -> VarySnapshot {
  response
    .vary()
    .into_iter()
    .filter(|name| name != "*")
    .map(|name| {
      let value = request.header(&name).map(String::from);
      (name, value)
    })
    .collect()
}

/// Whether `request` matches an entry stored with `snapshot` and `response`.
pub fn vary_matches(request: &Request, response: &Response, snapshot: &VarySnapshot) -> bool {
  if response.vary().iter().any(|name| name == "*") {
    return false;
  }

  snapshot
    .iter()
    .all(|(name, value)| request.header(name) == value.as_deref())
}
