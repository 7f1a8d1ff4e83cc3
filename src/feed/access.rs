//! The principal seam: channel authorization and grant sequences.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::TimedSet;

/// Well-known name for unnamed (guest) principals.
pub const GUEST_NAME: &str = "GUEST";

/// The authenticated principal a feed is running for.
///
/// `reload` refreshes the principal from its backing store after the feed
/// wakes from a wait; the feed compares `inherited_channels` across the
/// reload to detect newly granted channels.
pub trait Principal: Send {
    fn name(&self) -> &str;

    /// Id of the principal's own document, used to derive its vbucket.
    fn doc_id(&self) -> String;

    /// Sequence of the principal document's latest change, 0 if never
    /// written. Drives the `_user/` pseudo-entry.
    fn sequence(&self) -> u64;

    /// Expand wildcards and restrict the requested channels to those the
    /// principal may see, with the grant sequence for each.
    fn filter_to_available_channels(&self, requested: &BTreeSet<String>) -> TimedSet;

    /// All channels the principal currently has access to.
    fn inherited_channels(&self) -> BTreeSet<String>;

    fn reload(&mut self) -> Result<(), AccessError>;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccessError {
    #[error("principal `{name}` not found")]
    PrincipalNotFound { name: String },
    #[error("access backend error: {0}")]
    Backend(String),
}
