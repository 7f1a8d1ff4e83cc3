//! Backfill planning: the per-channel cursor for one outer iteration.

use std::collections::BTreeSet;

use crate::core::{ChannelGrant, SequenceId, VectorClock};

/// Decide the `since` a channel's feed starts from, based on the grant
/// sequence, the incoming cursor, and any in-flight backfill state.
///
/// Three cases:
/// 1. Grant already covered by the cursor and the channel is not newly
///    added: the cursor passes through unchanged.
/// 2. Channel newly granted (or grant ahead of the cursor with no flight
///    in progress): start a backfill flight from zero. The flight's
///    triggered-by clock is the cursor's changes clock with the grant
///    folded in; it bounds which log entries are tagged as backfill.
/// 3. The cursor carries a flight for this channel's grant: resume it
///    from the cursor's concrete position.
pub(crate) fn channel_since(
    channel: &str,
    grant: &ChannelGrant,
    since: &SequenceId,
    user_vb_no: u16,
    added_channels: Option<&BTreeSet<String>>,
) -> SequenceId {
    let seq_added_at = grant.sequence;
    // No vbucket on the grant means it was recorded on the principal doc.
    let vb_added_at = grant.vb_no.unwrap_or(user_vb_no);

    let is_new_channel = added_channels.is_some_and(|added| added.contains(channel));

    let backfill_in_progress = since
        .triggered_by_clock
        .as_ref()
        .is_some_and(|clock| clock.get(vb_added_at) == seq_added_at);

    let since_seq = since.changes_clock().get(vb_added_at);
    let backfill_required = seq_added_at > 0 && since_seq < seq_added_at;

    if is_new_channel || (backfill_required && !backfill_in_progress) {
        tracing::debug!(
            channel,
            seq = seq_added_at,
            vb_no = vb_added_at,
            "starting backfill for channel"
        );
        let mut frontier = since.changes_clock().clone();
        frontier.set_max(vb_added_at, seq_added_at);
        SequenceId {
            seq: 0,
            vb_no: 0,
            clock: VectorClock::new(),
            triggered_by: seq_added_at,
            triggered_by_vb_no: vb_added_at,
            triggered_by_clock: Some(frontier),
        }
    } else if backfill_in_progress {
        tracing::debug!(channel, "backfill in progress for channel");
        SequenceId {
            seq: since.seq,
            vb_no: since.vb_no,
            clock: VectorClock::new(),
            triggered_by: seq_added_at,
            triggered_by_vb_no: vb_added_at,
            triggered_by_clock: since.triggered_by_clock.clone(),
        }
    } else {
        since.clone()
    }
}
