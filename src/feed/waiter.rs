//! The wait primitive that parks an idle feed until the database advances.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::TimedSet;

/// Parks the feed until one of the subscribed channels advances or the
/// principal's access changes. Must hold no locks across `wait`.
pub trait ChangeWaiter: Send {
    /// Count of changes to the principal document observed so far. The
    /// feed reloads its principal when this grows.
    fn current_user_count(&self) -> u64;

    /// Re-subscribe to the current set of authorized channels.
    fn update_channels(&mut self, channels: &TimedSet);

    /// Block until something relevant changes. Returns false when the
    /// waiter has been closed and the feed should terminate.
    fn wait(&mut self) -> bool;
}

/// Starts a [`ChangeWaiter`] for a feed. Invoked once per wait-mode call,
/// before the feed's first iteration; failures surface synchronously from
/// the entry point.
pub trait WaiterSource: Send + Sync {
    fn start(&self, channels: &BTreeSet<String>) -> Result<Box<dyn ChangeWaiter>, WaiterError>;
}

/// Waiter source for embedders that never set `wait`.
pub struct NoWaiters;

impl WaiterSource for NoWaiters {
    fn start(&self, _channels: &BTreeSet<String>) -> Result<Box<dyn ChangeWaiter>, WaiterError> {
        Err(WaiterError("change waiter not configured".to_string()))
    }
}

#[derive(Debug, Error)]
#[error("change waiter unavailable: {0}")]
pub struct WaiterError(pub String);
