//! Values returned by the lifecycle handlers.

use crate::http::Response;

/// Result of a fetch, including where the response came from.
#[derive(Debug, Clone)]
pub struct Fetched {
  pub response: Response,
  pub source: ResponseSource,
}

impl Fetched {
  pub fn from_cache(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Cache,
    }
  }

  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Stored response, served verbatim
  Cache,
  /// Forwarded to the network on a cache miss
  Network,
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub bucket: String,
  pub seeded: usize,
}

/// Outcome of the activation sweep. Deletion failures are collected here, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
  /// Whitelisted buckets left in place
  pub kept: Vec<String>,
  pub deleted: Vec<String>,
  pub failed: Vec<DeletionFailure>,
}

impl SweepReport {
  pub fn is_clean(&self) -> bool {
    self.failed.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionFailure {
  pub bucket: String,
  pub reason: String,
}
