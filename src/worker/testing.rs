//! Test doubles for the network and cache storage.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

use super::interceptor::CacheSettings;
use crate::cache::{BucketInfo, CacheStorage, SqliteStorage};
use crate::error::{Result, WorkerError};
use crate::http::{Request, Response};
use crate::network::Network;

pub fn origin() -> Url {
  Url::parse("http://127.0.0.1:5000").unwrap()
}

/// Settings for the default seed list under `lovers-space-{version}`.
pub fn settings(version: &str) -> CacheSettings {
  let seed = ["/", "/static/manifest.json"]
    .iter()
    .map(|path| origin().join(path).unwrap())
    .collect();
  CacheSettings::new(format!("lovers-space-{}", version), seed)
}

/// Canned responses keyed by path. Unknown paths answer 404.
#[derive(Default)]
pub struct StubNetwork {
  routes: HashMap<String, Response>,
  offline: AtomicBool,
  calls: AtomicUsize,
}

impl StubNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(mut self, path: &str, response: Response) -> Self {
    self.routes.insert(path.to_string(), response);
    self
  }

  /// Make every subsequent fetch fail like a dropped connection.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Number of fetches issued so far, including failed ones.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  fn answer(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    if self.offline.load(Ordering::SeqCst) {
      return Err(WorkerError::Network {
        url: request.url.to_string(),
        reason: "connection refused".to_string(),
      });
    }

    Ok(
      self
        .routes
        .get(request.url.path())
        .cloned()
        .unwrap_or_else(|| Response::new(404, "Not Found")),
    )
  }
}

impl Network for StubNetwork {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    let answer = self.answer(request);
    async move { answer }
  }
}

/// SQLite storage whose deletion of one bucket always fails.
pub struct FlakyStorage {
  inner: SqliteStorage,
  broken: String,
}

impl FlakyStorage {
  pub fn new(inner: SqliteStorage, broken: &str) -> Self {
    Self {
      inner,
      broken: broken.to_string(),
    }
  }
}

impl CacheStorage for FlakyStorage {
  fn open(&self, name: &str) -> Result<()> {
    self.inner.open(name)
  }

  fn has(&self, name: &str) -> Result<bool> {
    self.inner.has(name)
  }

  fn keys(&self) -> Result<Vec<String>> {
    self.inner.keys()
  }

  fn delete(&self, name: &str) -> Result<bool> {
    if name == self.broken {
      return Err(WorkerError::Storage(format!("database is locked: {}", name)));
    }
    self.inner.delete(name)
  }

  fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
    self.inner.put_all(name, entries)
  }

  fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
    self.inner.match_in(name, request)
  }

  fn buckets(&self) -> Result<Vec<BucketInfo>> {
    self.inner.buckets()
  }

  fn mark_activated(&self, name: &str) -> Result<()> {
    self.inner.mark_activated(name)
  }

  fn is_activated(&self, name: &str) -> Result<bool> {
    self.inner.is_activated(name)
  }
}

/// SQLite storage with slow deletions that records how many overlapped.
pub struct SlowDeleteStorage {
  inner: SqliteStorage,
  delay: Duration,
  in_flight: AtomicUsize,
  peak: AtomicUsize,
}

impl SlowDeleteStorage {
  pub fn new(inner: SqliteStorage, delay: Duration) -> Self {
    Self {
      inner,
      delay,
      in_flight: AtomicUsize::new(0),
      peak: AtomicUsize::new(0),
    }
  }

  /// Most deletions ever running at the same time.
  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }
}

impl CacheStorage for SlowDeleteStorage {
  fn open(&self, name: &str) -> Result<()> {
    self.inner.open(name)
  }

  fn has(&self, name: &str) -> Result<bool> {
    self.inner.has(name)
  }

  fn keys(&self) -> Result<Vec<String>> {
    self.inner.keys()
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(running, Ordering::SeqCst);

    // Deletions run on the blocking pool, so a thread sleep holds the slot
    std::thread::sleep(self.delay);
    let outcome = self.inner.delete(name);

    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    outcome
  }

  fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
    self.inner.put_all(name, entries)
  }

  fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
    self.inner.match_in(name, request)
  }

  fn buckets(&self) -> Result<Vec<BucketInfo>> {
    self.inner.buckets()
  }

  fn mark_activated(&self, name: &str) -> Result<()> {
    self.inner.mark_activated(name)
  }

  fn is_activated(&self, name: &str) -> Result<bool> {
    self.inner.is_activated(name)
  }
}
