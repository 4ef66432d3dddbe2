//! Migration Orchestrator
//!
//! Drives one claimed work item through validation, token mapping, the
//! destination transfer and terminal status recording. This module is the
//! only place allowed to mutate remote or local status as a consequence of
//! an error: terminal failures are recorded remotely as `Failed` before the
//! error is returned, so the remote status never lags an observed local
//! failure.
//!
//! Steps within one run are strictly sequential; no step starts before the
//! previous one's remote side effect is acknowledged.

use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::chain::ChainClient;
use crate::localstate::{LocalStateCache, LocalStateError};
use crate::many::{self, ManyClient, ManyError, ValidationError};
use crate::store::{StoreError, WorkItem, WorkItemStatus, WorkItemStore};
use crate::tokens::{convert_precision, PrecisionError, TokenMap, SOURCE_PRECISION};

/// Upper bound on recorded failure text, in bytes.
pub const MAX_ERROR_LEN: usize = 8192;

#[derive(Debug, Error)]
pub enum MigrateError {
    /// The local snapshot is not in a resumable state. Fast fail, nothing
    /// touched.
    #[error("local work item status not valid for migration: {uuid}, {status}")]
    LocalStateInvalid { uuid: Uuid, status: WorkItemStatus },

    /// The remote item is not in a resumable state.
    #[error("remote work item status not valid for migration: {uuid}, {status}")]
    RemoteStateInvalid { uuid: Uuid, status: WorkItemStatus },

    /// Local and remote snapshots diverge beyond the permitted status
    /// drift. Fatal; requires operator intervention, no status mutation is
    /// attempted.
    #[error("local and remote work items do not match: {uuid}")]
    ConsistencyMismatch { uuid: Uuid },

    /// The source address is not on the migrations whitelist. Terminal.
    #[error("source address {from} is not authorized to migrate")]
    UnauthorizedSource { from: String },

    /// No destination mapping for the source token symbol. Terminal.
    #[error("no token mapping for source symbol {symbol:?}")]
    UnknownToken { symbol: String },

    /// The destination transfer failed. Terminal; only a forced re-claim
    /// can retry.
    #[error("destination transfer failed: {reason}")]
    Chain { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    LocalState(#[from] LocalStateError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Precision(#[from] PrecisionError),

    #[error(transparent)]
    Source(#[from] ManyError),
}

/// State machine driving one work item to a terminal state.
pub struct MigrationOrchestrator<'a> {
    store: &'a WorkItemStore,
    cache: &'a LocalStateCache,
    source: &'a ManyClient,
    chain: &'a dyn ChainClient,
    token_map: &'a TokenMap,
    verify_whitelist: bool,
}

impl<'a> MigrationOrchestrator<'a> {
    pub fn new(
        store: &'a WorkItemStore,
        cache: &'a LocalStateCache,
        source: &'a ManyClient,
        chain: &'a dyn ChainClient,
        token_map: &'a TokenMap,
    ) -> Self {
        Self {
            store,
            cache,
            source,
            chain,
            token_map,
            verify_whitelist: true,
        }
    }

    /// Disables or enables the whitelist policy gate (on by default).
    pub fn with_whitelist(mut self, enabled: bool) -> Self {
        self.verify_whitelist = enabled;
        self
    }

    /// Runs the migration for the given UUID to a terminal state.
    ///
    /// On success the item is `Completed`, its destination hash and
    /// confirmation time are recorded and the local snapshot is deleted.
    /// On a terminal failure the item is `Failed` with bounded error text
    /// and the local snapshot is retained for inspection.
    pub async fn run(&self, uuid: Uuid) -> Result<WorkItem, MigrateError> {
        // Resuming: the local snapshot must exist and be in flight.
        let mut item = self.cache.load(uuid)?;
        if !item.status.is_in_flight() {
            return Err(MigrateError::LocalStateInvalid {
                uuid,
                status: item.status,
            });
        }

        let remote = self.store.get(uuid).await?;
        if !remote.status.is_in_flight() {
            return Err(MigrateError::RemoteStateInvalid {
                uuid,
                status: remote.status,
            });
        }

        // Everything but status must match; status may drift one step while
        // a previous run died between the remote update and the local save.
        if !item.equal_ignoring_status(&remote) {
            error!(%uuid, "local and remote work items do not match");
            return Err(MigrateError::ConsistencyMismatch { uuid });
        }
        item.status = remote.status;

        // The source transaction feeds both the whitelist gate and the
        // authenticity checks. A malformed or unsupported transaction can
        // never become valid, so it is terminal; transport errors bubble up
        // untouched and leave the item resumable.
        let info = match self.source.tx_info(&item.many_hash).await {
            Ok(info) => info,
            Err(err @ (ManyError::UnsupportedMethod { .. } | ManyError::Decode { .. })) => {
                self.fail(&mut item, &err.to_string()).await?;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        // Authorizing: optional policy gate, checked before any funds move.
        if self.verify_whitelist {
            let whitelist = self.store.whitelist().await?;
            if !whitelist.iter().any(|addr| addr == &info.from) {
                let reason = format!(
                    "source address {} is not in the migrations whitelist",
                    info.from
                );
                self.fail(&mut item, &reason).await?;
                return Err(MigrateError::UnauthorizedSource { from: info.from });
            }
        }

        // Advance to Migrating. Idempotent: a resumed run whose remote side
        // already moved on skips the update.
        if item.status != WorkItemStatus::Migrating {
            self.store.update(&item, WorkItemStatus::Migrating).await?;
            item.status = WorkItemStatus::Migrating;
            self.cache.save(&item)?;
        }

        // Verifying: authenticity of the source transaction.
        if let Err(err) = many::validate(&info, item.uuid, &item.manifest_address) {
            self.fail(&mut item, &err.to_string()).await?;
            return Err(err.into());
        }

        // Token mapping and precision conversion.
        let token = match self.token_map.get(&info.symbol) {
            Some(token) => token.clone(),
            None => {
                let reason = format!("no token mapping for source symbol {:?}", info.symbol);
                self.fail(&mut item, &reason).await?;
                return Err(MigrateError::UnknownToken {
                    symbol: info.symbol,
                });
            }
        };

        let amount = match convert_precision(&info.amount, SOURCE_PRECISION, token.precision) {
            Ok(amount) => amount,
            Err(err) => {
                self.fail(&mut item, &err.to_string()).await?;
                return Err(err.into());
            }
        };

        // Transferring.
        info!(%uuid, amount = %amount, denom = %token.denom, "executing migration transfer");
        let result = match self
            .chain
            .transfer(
                &item.manifest_address,
                amount,
                &token.denom,
                &item.uuid.to_string(),
            )
            .await
        {
            Ok(result) if result.tx_hash.is_empty() => {
                let reason = "transfer returned an empty destination transaction hash".to_string();
                self.fail(&mut item, &reason).await?;
                return Err(MigrateError::Chain { reason });
            }
            Ok(result) => result,
            Err(err) => {
                let reason = truncate_middle(&format!("{err:#}"), MAX_ERROR_LEN);
                self.fail(&mut item, &reason).await?;
                return Err(MigrateError::Chain { reason });
            }
        };

        // Finalizing: record the destination hash and confirmation time,
        // then drop the local snapshot.
        item.manifest_hash = Some(result.tx_hash);
        item.manifest_datetime = Some(result.block_time);
        self.store.update(&item, WorkItemStatus::Completed).await?;
        item.status = WorkItemStatus::Completed;
        self.cache.delete(item.uuid)?;

        info!(%uuid, hash = item.manifest_hash.as_deref().unwrap_or(""), "migration completed");
        Ok(item)
    }

    /// Records a terminal failure: remote first, then the local snapshot,
    /// which is retained for inspection and forced re-claim.
    async fn fail(&self, item: &mut WorkItem, reason: &str) -> Result<(), MigrateError> {
        error!(uuid = %item.uuid, reason, "migration failed");

        item.error = Some(truncate_middle(reason, MAX_ERROR_LEN));
        self.store.update(item, WorkItemStatus::Failed).await?;
        item.status = WorkItemStatus::Failed;
        self.cache.save(item)?;
        Ok(())
    }
}

/// Bounds `text` to `max` bytes by cutting out the middle, preserving prefix
/// and suffix context. Cuts only at UTF-8 character boundaries, so the
/// result may come in slightly under the bound.
pub fn truncate_middle(text: &str, max: usize) -> String {
    const ELLIPSIS: &str = " ... ";

    if text.len() <= max {
        return text.to_string();
    }
    if max <= ELLIPSIS.len() {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        return text[..end].to_string();
    }

    let keep = max - ELLIPSIS.len();
    let mut head_end = keep / 2;
    while !text.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = text.len() - (keep - keep / 2);
    while !text.is_char_boundary(tail_start) {
        tail_start += 1;
    }

    format!("{}{}{}", &text[..head_end], ELLIPSIS, &text[tail_start..])
}
