#![forbid(unsafe_code)]

//! Multi-channel change-feed merger for a vbucket-partitioned document
//! store.
//!
//! A principal subscribes to a set of logical channels and receives one
//! ordered stream of document change notifications drawn from all of them.
//! Ordering is defined by a vector clock (one sequence per vbucket shard);
//! when the principal's channel membership changes mid-stream, entries
//! newer than the cursor but older than the grant are backfilled without
//! duplicating what was already delivered and without blocking live
//! entries on other channels.
//!
//! The durable change log, authorization, the wait primitive, clock
//! hashing, and transport all live outside this crate, behind the traits
//! in [`feed`].

pub mod config;
pub mod core;
pub mod error;
pub mod feed;
pub mod telemetry;

pub use config::Limits;
pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the public surface at the crate root for convenience
pub use crate::core::{
    ChangeEntry, ChangeRev, ChannelGrant, LogEntry, SequenceId, TimedSet, VbSequence, VectorClock,
    at_sequence,
};
pub use crate::feed::{
    AccessError, Bucket, CacheError, ChangeCache, ChangeWaiter, ChangesOptions, CrcBucket,
    DocumentStore, FeedContext, FeedItem, FeedStats, GUEST_NAME, HashError, NoDocuments, NoWaiters,
    Principal, SequenceHasher, Sha256Hasher, Terminator, Trigger, WaiterError, WaiterSource,
};
