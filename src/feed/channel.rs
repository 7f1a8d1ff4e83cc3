//! The per-channel feed: an ordered, producer-closed stream of changes for
//! one channel since a cursor.

use std::thread;

use crossbeam::channel::{Receiver, Sender, bounded};

use crate::config::Limits;
use crate::core::{ChangeEntry, LogEntry, SequenceId, VectorClock};
use crate::feed::cache::{CacheError, ChangeCache};
use crate::feed::options::ChangesOptions;
use crate::feed::stats::FeedStats;

/// Start the feed for one channel. The change log is fetched synchronously
/// so cache errors surface from this call; the entries are then emitted
/// from a producer thread over a bounded queue. Does NOT handle the wait
/// option and does not check authorization.
pub(crate) fn start_channel_feed(
    cache: &dyn ChangeCache,
    channel: &str,
    options: ChangesOptions,
    limits: &Limits,
    stats: &FeedStats,
) -> Result<Receiver<ChangeEntry>, CacheError> {
    stats.channel_feed_started();
    let log = cache.get_changes(channel, &options)?;
    tracing::debug!(channel, entries = log.len(), "channel feed fetched changes");

    if log.is_empty() {
        // No entries newer than the cursor: an already-closed feed.
        let (_tx, rx) = bounded(1);
        return Ok(rx);
    }

    let (tx, rx) = bounded(limits.channel_queue_entries);
    let channel = channel.to_string();
    thread::spawn(move || run_channel_feed(log, options, channel, tx));
    Ok(rx)
}

fn run_channel_feed(
    log: Vec<LogEntry>,
    options: ChangesOptions,
    channel: String,
    feed: Sender<ChangeEntry>,
) {
    let since = &options.since;
    let mut log: Vec<Option<LogEntry>> = log.into_iter().map(Some).collect();

    // Backfill block first, when the cursor carries a flight.
    if let Some(frontier) = since.triggered_by_clock.clone() {
        for slot in &mut log {
            let Some(entry) = slot.as_ref() else { continue };

            // At or below the flight's frontier for its vbucket: part of
            // the backfill, tagged with the triggering grant.
            let is_backfill = entry.seq <= frontier.get(entry.vb_no);

            // Skip what the cursor already covers (live portion and the
            // flight's resume position).
            let is_pending = since.vbucket_sequence_before(entry.vb_no, entry.seq);

            if is_backfill && is_pending {
                let seq_id = SequenceId {
                    seq: entry.seq,
                    vb_no: entry.vb_no,
                    clock: VectorClock::new(),
                    triggered_by: since.triggered_by,
                    triggered_by_vb_no: since.triggered_by_vb_no,
                    triggered_by_clock: Some(frontier.clone()),
                };
                let change = ChangeEntry::from_log(entry, seq_id, &channel);
                crossbeam::select! {
                    recv(options.terminator.receiver()) -> _ => {
                        tracing::debug!(channel = %channel, "aborting channel feed");
                        return;
                    }
                    send(feed, change) -> res => {
                        if res.is_err() {
                            return;
                        }
                    }
                }
            }
            if is_backfill {
                // Consumed by the backfill pass; not resent below.
                *slot = None;
            }
        }
    }

    // Remaining entries go out live.
    for slot in log {
        let Some(entry) = slot else { continue };
        let seq_id = SequenceId::new(entry.vb_no, entry.seq);
        let change = ChangeEntry::from_log(&entry, seq_id, &channel);
        crossbeam::select! {
            recv(options.terminator.receiver()) -> _ => {
                tracing::debug!(channel = %channel, "aborting channel feed");
                return;
            }
            send(feed, change) -> res => {
                if res.is_err() {
                    return;
                }
            }
        }
    }
}
