//! The changes feed: per-channel producers, backfill planning, and the
//! k-way merge.
//!
//! Provides:
//! - the `FeedContext` entry point and its outer loop
//! - per-channel and `_user/` pseudo feeds
//! - backfill flight planning per channel grant
//! - the trait seams for the change cache, access layer, wait primitive,
//!   sequence hasher, partition map, and document store

pub mod access;
mod backfill;
pub mod cache;
mod channel;
pub mod docs;
pub mod hasher;
mod merger;
pub mod multi;
pub mod options;
pub mod partition;
pub mod stats;
mod user;
pub mod waiter;

pub use access::{AccessError, GUEST_NAME, Principal};
pub use cache::{CacheError, ChangeCache};
pub use docs::{DocumentStore, NoDocuments};
pub use hasher::{HashError, SequenceHasher, Sha256Hasher};
pub use multi::FeedContext;
pub use options::{ChangesOptions, FeedItem, Terminator, Trigger};
pub use partition::{Bucket, CrcBucket};
pub use stats::FeedStats;
pub use waiter::{ChangeWaiter, NoWaiters, WaiterError, WaiterSource};
