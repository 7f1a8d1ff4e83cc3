//! Sequence identifiers and the merge ordering.
//!
//! A `SequenceId` places one change entry in the merged stream. Live entries
//! order by their concrete `(seq, vb_no)` position; backfill entries carry
//! the grant sequence that triggered them and sort so that a complete
//! backfill flight precedes live entries issued after the grant.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use super::clock::VectorClock;

/// A position in one vbucket partition. Ordered vbucket-major, the order a
/// backfill flight is emitted in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VbSequence {
    pub vb_no: u16,
    pub seq: u64,
}

impl VbSequence {
    pub fn new(vb_no: u16, seq: u64) -> Self {
        Self { vb_no, seq }
    }
}

/// The ordering key carried on every change entry.
///
/// `triggered_by` is non-zero iff the entry belongs to a backfill flight; it
/// names the grant sequence that caused the flight, and `triggered_by_clock`
/// is the live frontier captured when the flight began (grant included).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceId {
    pub seq: u64,
    pub vb_no: u16,
    /// Cumulative clock up to and including this entry. Emitted entries
    /// carry only the hashed token.
    pub clock: VectorClock,
    pub triggered_by: u64,
    pub triggered_by_vb_no: u16,
    pub triggered_by_clock: Option<VectorClock>,
}

impl SequenceId {
    pub fn new(vb_no: u16, seq: u64) -> Self {
        Self {
            seq,
            vb_no,
            ..Self::default()
        }
    }

    pub fn is_backfill(&self) -> bool {
        self.triggered_by > 0
    }

    /// The concrete position of this entry in its partition.
    pub fn position(&self) -> VbSequence {
        VbSequence::new(self.vb_no, self.seq)
    }

    /// The clock that positions this cursor for change reads: the
    /// triggered-by frontier while a backfill flight is in progress,
    /// otherwise the live clock.
    pub fn changes_clock(&self) -> &VectorClock {
        self.triggered_by_clock.as_ref().unwrap_or(&self.clock)
    }

    fn order_key(&self) -> (u64, u8, u16, u64) {
        if self.is_backfill() {
            (self.triggered_by, 0, self.vb_no, self.seq)
        } else {
            (self.seq, 1, self.vb_no, 0)
        }
    }

    /// Strict total order over merge positions. Live entries compare by
    /// `(seq, vb_no)` with `seq` primary; backfill entries compare by
    /// `(triggered_by, vb_no, seq)`; across the two kinds the flight's
    /// grant sequence stands in for the live sequence, with the flight
    /// winning ties.
    pub fn before(&self, other: &SequenceId) -> bool {
        self.order_key() < other.order_key()
    }

    /// Coalescing equality: two heads collapse to one emission only when
    /// they occupy the same concrete position in the same flight (or both
    /// are live). A live and a backfill entry on the same `(vb_no, seq)`
    /// are distinct emissions.
    pub fn same_position(&self, other: &SequenceId) -> bool {
        self.position() == other.position() && self.triggered_by == other.triggered_by
    }

    /// True iff `(vb_no, seq)` lies strictly after this cursor: past the
    /// live clock's frontier for that vbucket, and past the concrete
    /// resume position in flight-emission order.
    pub fn vbucket_sequence_before(&self, vb_no: u16, seq: u64) -> bool {
        if seq <= self.clock.get(vb_no) {
            return false;
        }
        VbSequence::new(vb_no, seq) > self.position()
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.clock.hashed_value().is_empty() {
            return write!(f, "{}", self.clock.hashed_value());
        }
        if self.is_backfill() {
            write!(f, "{}:{}.{}", self.triggered_by, self.vb_no, self.seq)
        } else {
            write!(f, "{}.{}", self.vb_no, self.seq)
        }
    }
}

/// Entries ship their cursor as the compressed token (or the `vb.seq`
/// rendering when no token has been stamped).
impl Serialize for SequenceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
