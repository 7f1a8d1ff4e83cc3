//! The outer changes loop and the feed's single entry point.
//!
//! Each call owns its collaborators for the duration of the feed: the
//! context is consumed, the outer loop runs on its own thread, and the
//! output stream closes on every exit path.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel::{Receiver, Sender, bounded};

use crate::config::Limits;
use crate::core::{ChangeEntry, TimedSet, at_sequence};
use crate::feed::access::{AccessError, Principal};
use crate::feed::backfill;
use crate::feed::cache::ChangeCache;
use crate::feed::channel::start_channel_feed;
use crate::feed::docs::{DocumentStore, NoDocuments};
use crate::feed::hasher::SequenceHasher;
use crate::feed::merger::{self, MergeStatus};
use crate::feed::options::{ChangesOptions, FeedItem};
use crate::feed::partition::Bucket;
use crate::feed::stats::FeedStats;
use crate::feed::user::user_feed;
use crate::feed::waiter::{ChangeWaiter, WaiterSource};

/// Everything one changes-feed call runs against. Consumed by
/// [`FeedContext::multi_changes_feed`]; nothing here outlives the call.
pub struct FeedContext {
    cache: Arc<dyn ChangeCache>,
    hasher: Arc<dyn SequenceHasher>,
    bucket: Arc<dyn Bucket>,
    docs: Arc<dyn DocumentStore>,
    waiters: Arc<dyn WaiterSource>,
    principal: Option<Box<dyn Principal>>,
    limits: Limits,
    stats: Arc<FeedStats>,
}

impl FeedContext {
    pub fn new(
        cache: Arc<dyn ChangeCache>,
        hasher: Arc<dyn SequenceHasher>,
        bucket: Arc<dyn Bucket>,
        waiters: Arc<dyn WaiterSource>,
    ) -> Self {
        Self {
            cache,
            hasher,
            bucket,
            docs: Arc::new(NoDocuments),
            waiters,
            principal: None,
            limits: Limits::default(),
            stats: Arc::new(FeedStats::default()),
        }
    }

    /// The authenticated principal this feed runs for. Without one the
    /// feed runs as guest: every requested channel granted at sequence 0,
    /// no `_user/` pseudo-entries.
    pub fn with_principal(mut self, principal: Box<dyn Principal>) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_docs(mut self, docs: Arc<dyn DocumentStore>) -> Self {
        self.docs = docs;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn stats(&self) -> Arc<FeedStats> {
        Arc::clone(&self.stats)
    }

    /// The ordered union of all changes made to the channels, as a stream.
    ///
    /// Setup failures surface here; later failures either close the stream
    /// early or deliver one synthetic error entry. The consumer sees
    /// change entries, an [`FeedItem::Idle`] marker whenever a waiting
    /// feed parks, and finally stream close.
    pub fn multi_changes_feed(
        self,
        channels: BTreeSet<String>,
        options: ChangesOptions,
    ) -> crate::Result<Receiver<FeedItem>> {
        let mut user_vb_no = 0u16;
        let mut to = String::new();
        if let Some(user) = &self.principal {
            if !user.name().is_empty() {
                to = format!(" (to {})", user.name());
                user_vb_no = self.bucket.vb_hash(&user.doc_id());
            }
        }
        tracing::debug!(channels = ?channels, options = ?options, "multi changes feed starting{to}");

        let change_waiter = if options.wait {
            Some(self.waiters.start(&channels)?)
        } else {
            None
        };

        let (output_tx, output_rx) = bounded(self.limits.output_queue_entries);
        thread::spawn(move || {
            self.run_outer_loop(channels, options, change_waiter, user_vb_no, to, output_tx);
        });
        Ok(output_rx)
    }

    fn run_outer_loop(
        mut self,
        channels: BTreeSet<String>,
        mut options: ChangesOptions,
        mut change_waiter: Option<Box<dyn ChangeWaiter>>,
        user_vb_no: u16,
        to: String,
        output: Sender<FeedItem>,
    ) {
        let _done = DoneGuard(to);
        let mut user_change_count = change_waiter
            .as_ref()
            .map_or(0, |waiter| waiter.current_user_count());
        let mut added_channels: Option<BTreeSet<String>> = None;
        let mut cumulative_clock = options.since.changes_clock().clone();
        let mut flight_hashes: BTreeMap<(u64, u16), String> = BTreeMap::new();

        // Re-runs the fetch after every database change, in wait mode.
        loop {
            let iteration_start = Instant::now();
            self.stats.outer_iteration();
            tracing::debug!(since = %options.since, "outer iteration starts");

            // Restrict to available channels, expand wildcards, and find
            // since when each has been available to the principal.
            let channels_since: TimedSet = match &self.principal {
                Some(user) => user.filter_to_available_channels(&channels),
                None => at_sequence(&channels, 0),
            };
            if let Some(waiter) = change_waiter.as_mut() {
                waiter.update_channels(&channels_since);
            }
            tracing::debug!(channels = ?channels_since, "channels expanded");

            let mut feeds = Vec::with_capacity(channels_since.len() + 1);
            for (name, grant) in &channels_since {
                let mut chan_opts = options.clone();
                chan_opts.since = backfill::channel_since(
                    name,
                    grant,
                    &options.since,
                    user_vb_no,
                    added_channels.as_ref(),
                );
                let feed = match start_channel_feed(
                    self.cache.as_ref(),
                    name,
                    chan_opts,
                    &self.limits,
                    &self.stats,
                ) {
                    Ok(feed) => feed,
                    Err(err) => {
                        tracing::warn!(
                            channel = %name,
                            "multi changes feed got error reading changes feed: {err}"
                        );
                        return;
                    }
                };
                feeds.push(feed);
            }

            // If the principal document itself has changed, a pseudo-feed
            // carries that to the client.
            if let Some(user) = &self.principal {
                if let Some(feed) = user_feed(user.as_ref(), &options.since, user_vb_no) {
                    feeds.push(feed);
                }
            }

            let outcome = merger::run_merge(
                feeds,
                &mut options,
                &mut cumulative_clock,
                &mut flight_hashes,
                self.hasher.as_ref(),
                self.docs.as_ref(),
                &self.stats,
                &output,
            );
            match outcome.status {
                MergeStatus::Terminated => return,
                MergeStatus::LimitReached => break,
                MergeStatus::Exhausted => {}
            }

            if !options.continuous && (outcome.sent_something || change_waiter.is_none()) {
                break;
            }
            let Some(waiter) = change_waiter.as_mut() else {
                break;
            };

            // Nothing to send: tell the reader we're idle, then park until
            // the database changes.
            tracing::debug!("multi changes feed waiting");
            crossbeam::select! {
                recv(options.terminator.receiver()) -> _ => return,
                send(output, FeedItem::Idle) -> res => {
                    if res.is_err() {
                        return;
                    }
                }
            }
            if !waiter.wait() {
                break;
            }
            if options.terminator.fired() {
                return;
            }

            // The principal's channel access may have changed while we
            // were parked; newly granted channels drive backfills in the
            // next iteration.
            let new_count = waiter.current_user_count();
            if new_count > user_change_count {
                tracing::debug!("multi changes feed reloading user");
                match self.reload_principal() {
                    Ok(added) => {
                        user_change_count = new_count;
                        added_channels = added;
                    }
                    Err(err) => {
                        tracing::warn!(
                            "user not found during reload - terminating changes feed: {err}"
                        );
                        let entry = ChangeEntry::error(
                            "user not found during reload - terminating changes feed",
                        );
                        let _ = output.send(FeedItem::Entry(Box::new(entry)));
                        return;
                    }
                }
            } else {
                added_channels = None;
            }
            tracing::debug!(
                elapsed_ms = iteration_start.elapsed().as_millis() as u64,
                "outer iteration complete"
            );
        }
    }

    fn reload_principal(&mut self) -> Result<Option<BTreeSet<String>>, AccessError> {
        let Some(user) = self.principal.as_mut() else {
            return Ok(None);
        };
        let previous = user.inherited_channels();
        user.reload()?;
        let added: BTreeSet<String> = user
            .inherited_channels()
            .difference(&previous)
            .cloned()
            .collect();
        if added.is_empty() {
            Ok(None)
        } else {
            tracing::debug!(channels = ?added, "modified channel set after user reload");
            Ok(Some(added))
        }
    }
}

struct DoneGuard(String);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        tracing::debug!("multi changes feed done{}", self.0);
    }
}
