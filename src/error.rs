//! Error types for the offline cache interceptor.
//! Covers seeding, network, storage and lifecycle-ordering failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
  /// A seed resource could not be fetched or came back with a non-2xx status.
  #[error("failed to seed {url}: {reason}")]
  SeedFailed { url: String, reason: String },

  /// Network failure on the passthrough path, surfaced unchanged to the caller.
  #[error("network error fetching {url}: {reason}")]
  Network { url: String, reason: String },

  #[error("only GET requests can be cached, got {0}")]
  UnsupportedMethod(String),

  #[error("invalid url '{url}': {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("lifecycle violation: {0}")]
  Lifecycle(String),

  #[error("no handler registered for lifecycle event '{0}'")]
  UnknownEvent(String),

  #[error("cache storage error: {0}")]
  Storage(String),

  #[error("cache database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("cache entry encoding error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
