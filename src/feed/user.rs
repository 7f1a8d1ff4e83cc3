//! The `_user/` pseudo-feed.
//!
//! When the principal document itself has changed past the cursor, the feed
//! injects a synthetic entry so clients refresh their access-control view.

use crossbeam::channel::{Receiver, bounded};

use crate::core::{ChangeEntry, SequenceId};
use crate::feed::access::{GUEST_NAME, Principal};

/// A single-entry, already-closed feed for the principal document, or
/// `None` when the cursor already covers the principal's own sequence.
pub(crate) fn user_feed(
    principal: &dyn Principal,
    since: &SequenceId,
    user_vb_no: u16,
) -> Option<Receiver<ChangeEntry>> {
    let user_seq = principal.sequence();
    if user_seq == 0 {
        return None;
    }
    if since.changes_clock().get(user_vb_no) >= user_seq {
        return None;
    }

    let name = match principal.name() {
        "" => GUEST_NAME,
        name => name,
    };
    tracing::debug!(user = name, "sending user doc to user feed");

    let entry = ChangeEntry {
        id: format!("_user/{name}"),
        seq: SequenceId::new(user_vb_no, user_seq),
        deleted: false,
        changes: Vec::new(),
        removed: None,
        doc: None,
        err: None,
    };
    let (tx, rx) = bounded(1);
    let _ = tx.send(entry);
    Some(rx)
}
