//! Core data model for the changes feed.
//!
//! Module hierarchy follows type dependency order:
//! - clock: VectorClock, the per-vbucket cursor primitive
//! - sequence: VbSequence, SequenceId and the merge ordering
//! - entry: LogEntry, ChangeRev, ChangeEntry
//! - grant: ChannelGrant, TimedSet

pub mod clock;
pub mod entry;
pub mod grant;
pub mod sequence;

pub use clock::VectorClock;
pub use entry::{ChangeEntry, ChangeRev, LogEntry};
pub use grant::{ChannelGrant, TimedSet, at_sequence};
pub use sequence::{SequenceId, VbSequence};
