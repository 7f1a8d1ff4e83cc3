//! Feed queue limits (normative defaults).

use serde::{Deserialize, Serialize};

/// Queue depths for a changes feed.
///
/// Values are intentionally explicit about their units. Depth 1 per
/// channel is sufficient: the merger always reads a head before a producer
/// may write its next value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Depth of the merged output queue between merger and consumer.
    pub output_queue_entries: usize,
    /// Depth of each per-channel producer queue.
    pub channel_queue_entries: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            output_queue_entries: 50,
            channel_queue_entries: 1,
        }
    }
}
