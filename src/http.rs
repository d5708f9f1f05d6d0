//! Request and response values passed between the page, the cache and the network.

use serde::{Deserialize, Serialize};
use url::Url;

/// An outgoing request dispatched through the worker's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  /// Header pairs with lowercased names
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Request {
  /// A plain GET for `url` with no headers.
  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_uppercase(),
      url,
      headers: Vec::new(),
      body: Vec::new(),
    }
  }

  #[allow(dead_code)]
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_lowercase(), value.to_string()));
    self
  }

  #[allow(dead_code)]
  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }
}

/// A response as returned by the network or stored in a cache bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  /// Header pairs with lowercased names
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  #[allow(dead_code)]
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: String::new(),
      headers: Vec::new(),
      body: body.into(),
    }
  }

  #[allow(dead_code)]
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_lowercase(), value.to_string()));
    self
  }

  #[allow(dead_code)]
  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }

  /// 2xx status.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Header names listed in `Vary`, lowercased.
  pub fn vary(&self) -> Vec<String> {
    self
      .headers
      .iter()
      .filter(|(name, _)| name == "vary")
      .flat_map(|(_, value)| value.split(','))
      .map(|name| name.trim().to_lowercase())
      .filter(|name| !name.is_empty())
      .collect()
  }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
  headers
    .iter()
    .find(|(n, _)| n.eq_ignore_ascii_case(name))
    .map(|(_, v)| v.as_str())
}
