//! Claim Engine
//!
//! Claims work items from the remote queue or by UUID and mirrors every
//! successful claim into the local state cache. The remote store performs
//! the claim atomically and is authoritative: a claim that could not be
//! persisted locally is still a claim, the cache write failure is only
//! logged.

use tracing::{info, warn};
use uuid::Uuid;

use crate::localstate::LocalStateCache;
use crate::store::{StoreError, WorkItem, WorkItemStore};

pub struct ClaimEngine<'a> {
    store: &'a WorkItemStore,
    cache: &'a LocalStateCache,
}

impl<'a> ClaimEngine<'a> {
    pub fn new(store: &'a WorkItemStore, cache: &'a LocalStateCache) -> Self {
        Self { store, cache }
    }

    /// Claims available work items from the queue.
    ///
    /// An empty result means no items were available; it is a success and
    /// distinguishable from any transport error.
    pub async fn claim_from_queue(&self) -> Result<Vec<WorkItem>, StoreError> {
        let mut items = self.store.claim_from_queue().await?;

        if items.is_empty() {
            info!("no work items available");
            return Ok(items);
        }

        for item in &mut items {
            self.persist(item);
        }

        Ok(items)
    }

    /// Claims one specific work item.
    ///
    /// Unless `force` is set, an item that is not in `Created` state is
    /// refused by the store and the resulting `InvalidState` error is
    /// surfaced verbatim.
    pub async fn claim_by_uuid(&self, uuid: Uuid, force: bool) -> Result<WorkItem, StoreError> {
        if force {
            warn!(%uuid, "forcing re-claim of work item");
        }

        let mut item = self.store.claim_by_uuid(uuid, force).await?;
        self.persist(&mut item);
        Ok(item)
    }

    /// Clears stale diagnostics and saves the claimed item locally.
    ///
    /// The server already wipes the previous failure text as part of the
    /// atomic claim; clearing it here keeps the local snapshot consistent
    /// even against an older server.
    fn persist(&self, item: &mut WorkItem) {
        item.error = None;

        if let Err(err) = self.cache.save(item) {
            warn!(uuid = %item.uuid, error = %err, "claimed work item could not be saved locally");
        } else {
            info!(uuid = %item.uuid, "claimed work item");
        }
    }
}
