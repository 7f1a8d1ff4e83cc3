//! Change-log entries and the entries emitted to feed consumers.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::Serialize;

use super::sequence::SequenceId;

/// One row of a channel's change log, as returned by the change cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub id: String,
    pub seq: u64,
    pub vb_no: u16,
    pub rev_id: String,
    pub flags: u8,
}

impl LogEntry {
    /// The revision is a deletion tombstone.
    pub const DELETED: u8 = 1;
    /// The document left this channel at this revision.
    pub const REMOVED: u8 = 2;

    pub fn new(id: impl Into<String>, vb_no: u16, seq: u64, rev_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            seq,
            vb_no,
            rev_id: rev_id.into(),
            flags: 0,
        }
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.flags & Self::DELETED != 0
    }

    pub fn is_removal(&self) -> bool {
        self.flags & Self::REMOVED != 0
    }
}

/// One revision reference on a change entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeRev {
    pub rev: String,
}

impl ChangeRev {
    pub fn new(rev: impl Into<String>) -> Self {
        Self { rev: rev.into() }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A change notification as delivered to the consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    pub id: String,
    pub seq: SequenceId,
    #[serde(skip_serializing_if = "is_false")]
    pub deleted: bool,
    pub changes: Vec<ChangeRev>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl ChangeEntry {
    /// Build the feed entry for one log row. A removal row reports the
    /// channel the document left in `removed`.
    pub fn from_log(entry: &LogEntry, seq: SequenceId, channel: &str) -> Self {
        let removed = entry
            .is_removal()
            .then(|| BTreeSet::from([channel.to_string()]));
        Self {
            id: entry.id.clone(),
            seq,
            deleted: entry.is_deleted(),
            changes: vec![ChangeRev::new(entry.rev_id.clone())],
            removed,
            doc: None,
            err: None,
        }
    }

    /// Synthetic entry reporting a feed-terminating error to the consumer.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            seq: SequenceId::default(),
            deleted: false,
            changes: Vec::new(),
            removed: None,
            doc: None,
            err: Some(message.into()),
        }
    }

    /// Union another entry's removed set into this one. The only mutation
    /// the merger performs when coalescing coincident sequences.
    pub fn merge_removed(&mut self, other: BTreeSet<String>) {
        match &mut self.removed {
            Some(removed) => removed.extend(other),
            None => self.removed = Some(other),
        }
    }
}
