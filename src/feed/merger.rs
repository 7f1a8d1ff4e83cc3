//! The k-way merge of per-channel feeds into one ordered output stream.

use std::collections::BTreeMap;

use crossbeam::channel::{Receiver, Sender};

use crate::core::{ChangeEntry, SequenceId, VectorClock};
use crate::feed::docs::DocumentStore;
use crate::feed::hasher::SequenceHasher;
use crate::feed::options::{ChangesOptions, FeedItem};
use crate::feed::stats::FeedStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MergeStatus {
    /// Every feed drained and closed.
    Exhausted,
    /// `options.limit` entries delivered; the feed is done.
    LimitReached,
    /// Terminator fired or the consumer went away.
    Terminated,
}

pub(crate) struct MergeOutcome {
    pub sent_something: bool,
    pub status: MergeStatus,
}

/// Merge the feeds by sequence until they drain, the limit is reached, or
/// the terminator fires. Coincident sequences coalesce to one emission (the
/// output stream is per document version, not per channel).
///
/// The cumulative clock reflects exactly the live entries delivered so far,
/// so the next iteration's cursor re-fetches only strictly newer live
/// entries. Backfill entries never advance it past their own position: the
/// grant sequence is folded in once per flight, nothing more, so live
/// entries on other vbuckets are not skipped.
pub(crate) fn run_merge(
    feeds: Vec<Receiver<ChangeEntry>>,
    options: &mut ChangesOptions,
    cumulative_clock: &mut VectorClock,
    flight_hashes: &mut BTreeMap<(u64, u16), String>,
    hasher: &dyn SequenceHasher,
    docs: &dyn DocumentStore,
    stats: &FeedStats,
    output: &Sender<FeedItem>,
) -> MergeOutcome {
    let mut feeds: Vec<Option<Receiver<ChangeEntry>>> = feeds.into_iter().map(Some).collect();
    let mut current: Vec<Option<ChangeEntry>> = feeds.iter().map(|_| None).collect();
    let mut sent_something = false;

    loop {
        // Refill the head slot of every still-open feed.
        for (slot, feed) in current.iter_mut().zip(feeds.iter_mut()) {
            if slot.is_none() {
                if let Some(rx) = feed.as_ref() {
                    match rx.recv() {
                        Ok(entry) => *slot = Some(entry),
                        Err(_) => *feed = None,
                    }
                }
            }
        }

        // The head with the minimum sequence goes out next.
        let mut min: Option<(usize, SequenceId)> = None;
        for (i, slot) in current.iter().enumerate() {
            let Some(entry) = slot else { continue };
            let replace = match &min {
                None => true,
                Some((_, min_seq)) => entry.seq.before(min_seq),
            };
            if replace {
                min = Some((i, entry.seq.clone()));
            }
        }
        let Some((min_index, min_seq)) = min else { break };
        let Some(mut min_entry) = current[min_index].take() else { break };

        // Clear every head at the emitted position, concatenating their
        // removed sets into the outgoing entry.
        for slot in current.iter_mut() {
            let duplicate = slot
                .as_ref()
                .is_some_and(|entry| entry.seq.same_position(&min_seq));
            if duplicate {
                if let Some(dup) = slot.take() {
                    if let Some(removed) = dup.removed {
                        min_entry.merge_removed(removed);
                    }
                }
            }
        }

        if options.include_docs || options.conflicts {
            docs.add_doc_to_entry(&mut min_entry, options.include_docs, options.conflicts);
        }

        if min_entry.seq.triggered_by == 0 {
            // Live entry: advance the cumulative clock and stamp the entry
            // with a clock carrying only the hashed token.
            cumulative_clock.set_max(min_entry.seq.vb_no, min_entry.seq.seq);
            min_entry.seq.clock = match hasher.hash(cumulative_clock) {
                Ok(token) => VectorClock::hashed(token),
                Err(err) => {
                    tracing::warn!(clock = %cumulative_clock, "error hashing cumulative clock: {err}");
                    VectorClock::new()
                }
            };
        } else {
            // Backfill entry: the flight's triggered-by clock is hashed
            // once, after folding the grant into the cumulative clock;
            // later entries of the flight reuse the token without
            // advancing the cumulative clock again.
            let key = (min_entry.seq.triggered_by, min_entry.seq.triggered_by_vb_no);
            let token = match flight_hashes.get(&key) {
                Some(token) => Some(token.clone()),
                None => {
                    cumulative_clock.set_max(key.1, key.0);
                    match hasher.hash(cumulative_clock) {
                        Ok(token) => {
                            flight_hashes.insert(key, token.clone());
                            Some(token)
                        }
                        Err(err) => {
                            tracing::warn!(clock = %cumulative_clock, "error hashing triggered-by clock: {err}");
                            None
                        }
                    }
                }
            };
            if let Some(token) = token {
                if let Some(frontier) = min_entry.seq.triggered_by_clock.as_mut() {
                    frontier.set_hashed_value(token);
                }
            }
        }

        let id = min_entry.id.clone();
        let seq = min_entry.seq.to_string();
        if options.terminator.fired() {
            return MergeOutcome {
                sent_something,
                status: MergeStatus::Terminated,
            };
        }
        crossbeam::select! {
            recv(options.terminator.receiver()) -> _ => {
                return MergeOutcome {
                    sent_something,
                    status: MergeStatus::Terminated,
                };
            }
            send(output, FeedItem::Entry(Box::new(min_entry))) -> res => {
                if res.is_err() {
                    return MergeOutcome {
                        sent_something,
                        status: MergeStatus::Terminated,
                    };
                }
            }
        }
        stats.entry_sent();
        sent_something = true;
        tracing::debug!(id = %id, seq = %seq, "wrote entry");

        if options.limit > 0 {
            options.limit -= 1;
            if options.limit == 0 {
                return MergeOutcome {
                    sent_something,
                    status: MergeStatus::LimitReached,
                };
            }
        }

        // Value snapshot: the next iteration's per-channel feeds must see
        // an immutable cursor.
        options.since.clock = cumulative_clock.clone();
    }

    MergeOutcome {
        sent_something,
        status: MergeStatus::Exhausted,
    }
}
