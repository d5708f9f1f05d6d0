//! Cache-first interceptor: seeds the current bucket, answers fetches from it,
//! and sweeps stale buckets on activation.

use futures::future;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::outcome::{DeletionFailure, Fetched, InstallReport, SweepReport};
use crate::cache::CacheStorage;
use crate::error::{Result, WorkerError};
use crate::http::{Request, Response};
use crate::network::Network;

/// Default number of stale buckets deleted at once during activation.
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 4;

/// What the interceptor caches and under which name.
#[derive(Debug, Clone)]
pub struct CacheSettings {
  /// Current bucket name, including its version tag
  pub cache_name: String,
  /// Resources stored at install time, in order
  pub seed: Vec<Url>,
  /// Upper bound on concurrent deletions during activation
  pub sweep_concurrency: usize,
}

impl CacheSettings {
  pub fn new(cache_name: impl Into<String>, seed: Vec<Url>) -> Self {
    Self {
      cache_name: cache_name.into(),
      seed,
      sweep_concurrency: DEFAULT_SWEEP_CONCURRENCY,
    }
  }

  /// Bucket names that survive activation.
  pub fn whitelist(&self) -> BTreeSet<&str> {
    BTreeSet::from([self.cache_name.as_str()])
  }
}

/// Mediates between the page and the network using a local cache.
///
/// The network path never writes to the cache; only install does.
pub struct Interceptor<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  settings: CacheSettings,
}

impl<S, N> Interceptor<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  pub fn new(storage: S, network: N, settings: CacheSettings) -> Self {
    Self::from_shared(Arc::new(storage), Arc::new(network), settings)
  }

  /// Build over storage and network handles shared with other interceptors.
  pub fn from_shared(storage: Arc<S>, network: Arc<N>, settings: CacheSettings) -> Self {
    Self {
      storage,
      network,
      settings,
    }
  }

  pub fn settings(&self) -> &CacheSettings {
    &self.settings
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  pub fn network(&self) -> &Arc<N> {
    &self.network
  }

  /// Open the current bucket and store every seed resource in it.
  ///
  /// Seeds are fetched concurrently. If any of them fails, nothing is written.
  pub async fn on_install(&self) -> Result<InstallReport> {
    let bucket = &self.settings.cache_name;
    self.storage.open(bucket)?;
    info!(bucket = %bucket, "Opened cache");

    let requests: Vec<Request> = self
      .settings
      .seed
      .iter()
      .cloned()
      .map(Request::get)
      .collect();

    let responses = future::try_join_all(requests.iter().map(|r| self.fetch_seed(r))).await?;
    let entries: Vec<(Request, Response)> = requests.into_iter().zip(responses).collect();

    self.storage.put_all(bucket, &entries)?;
    info!(bucket = %bucket, seeded = entries.len(), "Seeded cache");

    Ok(InstallReport {
      bucket: bucket.clone(),
      seeded: entries.len(),
    })
  }

  async fn fetch_seed(&self, request: &Request) -> Result<Response> {
    let url = request.url.to_string();

    let response = self
      .network
      .fetch(request)
      .await
      .map_err(|e| WorkerError::SeedFailed {
        url: url.clone(),
        reason: e.to_string(),
      })?;

    if !response.is_success() {
      return Err(WorkerError::SeedFailed {
        url,
        reason: format!("HTTP {} {}", response.status, response.status_text)
          .trim_end()
          .to_string(),
      });
    }

    if response.vary().iter().any(|name| name == "*") {
      return Err(WorkerError::SeedFailed {
        url,
        reason: "response varies on *".to_string(),
      });
    }

    Ok(response)
  }

  /// Answer a request from the current bucket, or forward it to the network unmodified.
  ///
  /// Stale buckets are never consulted, even when their deletion failed.
  pub async fn on_fetch(&self, request: Request) -> Result<Fetched> {
    if let Some(response) = self.storage.match_in(&self.settings.cache_name, &request)? {
      debug!(method = %request.method, url = %request.url, "Serving from cache");
      return Ok(Fetched::from_cache(response));
    }

    debug!(method = %request.method, url = %request.url, "Cache miss, forwarding to network");
    let response = self.network.fetch(&request).await?;
    Ok(Fetched::from_network(response))
  }

  /// Delete every bucket outside the whitelist, then record the current bucket as activated.
  ///
  /// Deletions run concurrently up to `sweep_concurrency`. A failed deletion is
  /// recorded in the report and does not stop the others.
  pub async fn on_activate(&self) -> Result<SweepReport> {
    let whitelist = self.settings.whitelist();
    let (kept, stale): (Vec<String>, Vec<String>) = self
      .storage
      .keys()?
      .into_iter()
      .partition(|name| whitelist.contains(name.as_str()));

    let limit = self.settings.sweep_concurrency.max(1);
    let results: Vec<(String, std::result::Result<bool, String>)> = stream::iter(stale)
      .map(|name| {
        let storage = Arc::clone(&self.storage);
        async move {
          let target = name.clone();
          let outcome = tokio::task::spawn_blocking(move || storage.delete(&target)).await;
          let outcome = match outcome {
            Ok(Ok(existed)) => Ok(existed),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("deletion task failed: {}", e)),
          };
          (name, outcome)
        }
      })
      .buffer_unordered(limit)
      .collect()
      .await;

    let mut report = SweepReport {
      kept,
      ..SweepReport::default()
    };

    for (bucket, outcome) in results {
      match outcome {
        Ok(existed) => {
          debug!(bucket = %bucket, existed, "Deleted stale cache");
          report.deleted.push(bucket);
        }
        Err(reason) => {
          warn!(bucket = %bucket, reason = %reason, "Failed to delete stale cache");
          report.failed.push(DeletionFailure { bucket, reason });
        }
      }
    }

    report.deleted.sort();
    report.failed.sort_by(|a, b| a.bucket.cmp(&b.bucket));

    if report.kept.contains(&self.settings.cache_name) {
      self.storage.mark_activated(&self.settings.cache_name)?;
    }

    info!(
      kept = report.kept.len(),
      deleted = report.deleted.len(),
      failed = report.failed.len(),
      "Activation sweep finished"
    );

    Ok(report)
  }
}

impl<S: CacheStorage, N: Network> Clone for Interceptor<S, N> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      network: Arc::clone(&self.network),
      settings: self.settings.clone(),
    }
  }
}
