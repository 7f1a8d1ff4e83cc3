//! Feed options, cancellation, and the items a consumer receives.

use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, TryRecvError, bounded, never};

use crate::core::{ChangeEntry, SequenceId};

/// External cancellation signal for a changes feed.
///
/// Observed at every send into a feed queue; firing it is a normal,
/// non-error exit. Timeouts are implemented outside the core by firing the
/// terminator.
#[derive(Clone, Debug)]
pub struct Terminator {
    rx: Receiver<()>,
}

impl Terminator {
    /// A terminator paired with the trigger that fires it.
    pub fn new() -> (Trigger, Terminator) {
        let (tx, rx) = bounded(0);
        (Trigger { _tx: tx }, Terminator { rx })
    }

    /// A terminator that never fires.
    pub fn never() -> Terminator {
        Terminator { rx: never() }
    }

    pub fn fired(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Fires its terminator when dropped or explicitly fired. All clones of the
/// paired terminator observe the signal.
#[derive(Debug)]
pub struct Trigger {
    _tx: Sender<()>,
}

impl Trigger {
    pub fn fire(self) {}
}

/// Options for one changes-feed call.
#[derive(Clone, Debug)]
pub struct ChangesOptions {
    /// Cursor: vector clock plus optional backfill state.
    pub since: SequenceId,
    /// 0 = unlimited.
    pub limit: u32,
    /// Block when idle instead of returning.
    pub wait: bool,
    /// Never terminate on idle. Implies `wait`.
    pub continuous: bool,
    /// Attach the document body to each entry.
    pub include_docs: bool,
    /// Attach conflicting revision ids to each entry.
    pub conflicts: bool,
    pub terminator: Terminator,
    /// Keep-alive interval for idle transports. The core ignores it; the
    /// transport layer implements it.
    pub heartbeat: Option<Duration>,
}

impl Default for ChangesOptions {
    fn default() -> Self {
        Self {
            since: SequenceId::default(),
            limit: 0,
            wait: false,
            continuous: false,
            include_docs: false,
            conflicts: false,
            terminator: Terminator::never(),
            heartbeat: None,
        }
    }
}

/// One item on the merged output stream.
#[derive(Clone, Debug)]
pub enum FeedItem {
    Entry(Box<ChangeEntry>),
    /// The feed found nothing to send and is parking on its waiter.
    /// Emitted only in wait mode, at most once per idle period.
    Idle,
}

impl FeedItem {
    pub fn into_entry(self) -> Option<ChangeEntry> {
        match self {
            FeedItem::Entry(entry) => Some(*entry),
            FeedItem::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_terminator_does_not_fire() {
        let terminator = Terminator::never();
        assert!(!terminator.fired());
    }

    #[test]
    fn firing_trigger_reaches_all_clones() {
        let (trigger, terminator) = Terminator::new();
        let clone = terminator.clone();
        assert!(!terminator.fired());
        trigger.fire();
        assert!(terminator.fired());
        assert!(clone.fired());
    }

    #[test]
    fn dropping_trigger_fires() {
        let (trigger, terminator) = Terminator::new();
        drop(trigger);
        assert!(terminator.fired());
    }
}
