//! Channel grants: since when a principal can see each channel.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// The sequence at which a principal gained access to one channel.
///
/// A missing `vb_no` denotes a grant recorded against the principal
/// document itself; the feed substitutes the principal's own vbucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGrant {
    pub sequence: u64,
    pub vb_no: Option<u16>,
}

impl ChannelGrant {
    pub fn new(sequence: u64, vb_no: u16) -> Self {
        Self {
            sequence,
            vb_no: Some(vb_no),
        }
    }

    /// Grant recorded on the principal document (no vbucket of its own).
    pub fn at(sequence: u64) -> Self {
        Self {
            sequence,
            vb_no: None,
        }
    }
}

/// Channel name to grant, as produced by the access layer.
pub type TimedSet = BTreeMap<String, ChannelGrant>;

/// Grant every channel in the set at the given sequence. Used for guest
/// access, where all requested channels are visible from the start.
pub fn at_sequence(channels: &BTreeSet<String>, sequence: u64) -> TimedSet {
    channels
        .iter()
        .map(|name| (name.clone(), ChannelGrant::at(sequence)))
        .collect()
}
