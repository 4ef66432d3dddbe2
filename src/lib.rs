//! MFX Migrator Library
//!
//! This crate moves MFX value records from the MANY ledger to the Manifest
//! chain, one work item at a time, coordinated through a remote work-item
//! database shared by possibly many worker processes. The remote store is
//! authoritative for claims; a local per-UUID snapshot file allows a crashed
//! worker to resume.

pub mod chain;
pub mod claim;
pub mod config;
pub mod http;
pub mod localstate;
pub mod many;
pub mod migrate;
pub mod store;
pub mod tokens;

// Re-export commonly used types
pub use chain::{ChainClient, ManifestCliClient, TxResult};
pub use claim::ClaimEngine;
pub use config::{AuthConfig, ChainConfig, MigrationConfig, RemoteConfig};
pub use http::{HttpClient, RetryPolicy};
pub use localstate::LocalStateCache;
pub use many::{ManyClient, SourceTxInfo};
pub use migrate::{MigrationOrchestrator, MAX_ERROR_LEN};
pub use store::{WorkItem, WorkItemStatus, WorkItemStore};
pub use tokens::{TokenInfo, TokenMap};
