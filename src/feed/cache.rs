//! The per-channel change log, consumed through a trait seam.

use thiserror::Error;

use crate::core::LogEntry;
use crate::feed::options::ChangesOptions;

/// Source of ordered change-log entries for one channel.
///
/// For reads without backfill state (`since.triggered_by_clock` is `None`)
/// the cache returns entries strictly after the cursor's live portion. For
/// backfill reads it returns at least everything up to the triggered-by
/// frontier; newer entries are fine and are classified live by the feed.
pub trait ChangeCache: Send + Sync {
    fn get_changes(
        &self,
        channel: &str,
        options: &ChangesOptions,
    ) -> Result<Vec<LogEntry>, CacheError>;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("channel `{channel}` unavailable: {reason}")]
    ChannelUnavailable { channel: String, reason: String },
    #[error("change cache backend error: {0}")]
    Backend(String),
}
