//! Named cache buckets holding request/response pairs.
//!
//! This module provides the storage side of the offline shim:
//! - Buckets are created lazily on first open and only removed whole
//! - Entries are keyed by request identity (GET + URL + `Vary` headers)
//! - Batch writes are atomic, so a bucket never holds half a seed list

mod identity;
mod storage;

pub use storage::{BucketInfo, CacheStorage, SqliteStorage};
