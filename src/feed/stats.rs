//! Observability counters. Outside the feed's correctness.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct FeedStats {
    channel_feeds_started: AtomicU64,
    outer_iterations: AtomicU64,
    entries_sent: AtomicU64,
}

impl FeedStats {
    pub(crate) fn channel_feed_started(&self) {
        self.channel_feeds_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn outer_iteration(&self) {
        self.outer_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn entry_sent(&self) {
        self.entries_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_feeds_started(&self) -> u64 {
        self.channel_feeds_started.load(Ordering::Relaxed)
    }

    pub fn outer_iterations(&self) -> u64 {
        self.outer_iterations.load(Ordering::Relaxed)
    }

    pub fn entries_sent(&self) -> u64 {
        self.entries_sent.load(Ordering::Relaxed)
    }
}
