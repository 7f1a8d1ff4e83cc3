//! Per-vbucket sequence clocks.
//!
//! A `VectorClock` is the cursor type for the changes feed: one high-water
//! sequence per vbucket, with absent entries meaning zero. Clocks are only
//! comparable by per-vbucket inspection; there is no global ordering.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sparse per-vbucket high-water-mark map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VectorClock {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    seqs: BTreeMap<u16, u64>,
    /// Opaque compressed token filled in by a `SequenceHasher`. Cleared by
    /// any advance of the clock.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    hashed_value: String,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock carrying only a hashed token, for emission on change entries.
    pub fn hashed(token: impl Into<String>) -> Self {
        Self {
            seqs: BTreeMap::new(),
            hashed_value: token.into(),
        }
    }

    pub fn get(&self, vb_no: u16) -> u64 {
        self.seqs.get(&vb_no).copied().unwrap_or(0)
    }

    /// Monotonic-maximum update. Returns true if the clock advanced; an
    /// advance invalidates a previously stored hashed token.
    pub fn set_max(&mut self, vb_no: u16, seq: u64) -> bool {
        if seq <= self.get(vb_no) {
            return false;
        }
        self.seqs.insert(vb_no, seq);
        self.hashed_value.clear();
        true
    }

    pub fn hashed_value(&self) -> &str {
        &self.hashed_value
    }

    pub fn set_hashed_value(&mut self, token: impl Into<String>) {
        self.hashed_value = token.into();
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (u16, u64)> + '_ {
        self.seqs.iter().map(|(&vb_no, &seq)| (vb_no, seq))
    }
}

/// Equality is over the per-vbucket sequences; the hashed token is a cache,
/// not part of the clock's value.
impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.seqs == other.seqs
    }
}

impl Eq for VectorClock {}

impl FromIterator<(u16, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (u16, u64)>>(iter: I) -> Self {
        let mut clock = VectorClock::new();
        for (vb_no, seq) in iter {
            clock.set_max(vb_no, seq);
        }
        clock
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (vb_no, seq)) in self.entries().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{vb_no}:{seq}")?;
        }
        write!(f, "}}")
    }
}
