//! Crate-level error type.
//!
//! Not a "god error": a thin wrapper over the per-seam capability errors,
//! so embedders can match on the seam that failed.

use thiserror::Error;

use crate::feed::access::AccessError;
use crate::feed::cache::CacheError;
use crate::feed::hasher::HashError;
use crate::feed::waiter::WaiterError;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Waiter(#[from] WaiterError),
}
