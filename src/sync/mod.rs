//! The incremental synchronization pipeline: bulk pagination, delta
//! polling, lazy enrichment, and the orchestrating controller.

pub(crate) mod controller;
pub(crate) mod detail_cache;
pub(crate) mod pager;
pub(crate) mod poller;

pub use controller::{FeedController, FeedSnapshot, Phase};
pub use detail_cache::EntityDetailCache;
pub use pager::BulkPageLoader;

use crate::api::FetchError;
use thiserror::Error;

/// Pipeline-level errors.
///
/// [`SyncError::StaleScope`] is internal control flow — a response
/// resolved after its scope was invalidated. It is never surfaced to the
/// user as a failure; callers that receive it simply stop, because a
/// newer scope owns the state.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Response belongs to a superseded scope")]
    StaleScope,
}
