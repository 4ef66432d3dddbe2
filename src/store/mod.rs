//! Work-Item Store Module
//!
//! Typed client for the remote work-item database. One work item describes a
//! single pending migration, keyed by UUID. The server is authoritative for
//! the claim protocol: claiming happens through dedicated atomic endpoints
//! and this client never computes the next status itself on the claim path.
//!
//! Every operation is a single HTTP round trip with JSON bodies. Transient
//! failures are retried by the transport layer; logical failures (wrong
//! state, rejected update) surface as distinct [`StoreError`] variants.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::http::{HttpClient, HttpError};

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Lifecycle status of a work item.
///
/// The wire format is the integer code; the lowercase name is only used for
/// display and logging. Progression is
/// `Created -> Claimed -> Migrating -> Completed`, with `Claimed|Migrating ->
/// Failed` and `Failed -> Claimed` on a forced re-claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItemStatus {
    Created = 1,
    Claimed = 2,
    Migrating = 3,
    Completed = 4,
    Failed = 5,
}

impl WorkItemStatus {
    /// True for the two states owned by a worker process.
    pub fn is_in_flight(self) -> bool {
        matches!(self, WorkItemStatus::Claimed | WorkItemStatus::Migrating)
    }
}

impl TryFrom<u8> for WorkItemStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(WorkItemStatus::Created),
            2 => Ok(WorkItemStatus::Claimed),
            3 => Ok(WorkItemStatus::Migrating),
            4 => Ok(WorkItemStatus::Completed),
            5 => Ok(WorkItemStatus::Failed),
            other => Err(format!("unknown work item status code: {other}")),
        }
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkItemStatus::Created => "created",
            WorkItemStatus::Claimed => "claimed",
            WorkItemStatus::Migrating => "migrating",
            WorkItemStatus::Completed => "completed",
            WorkItemStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl Serialize for WorkItemStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for WorkItemStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        WorkItemStatus::try_from(code).map_err(serde::de::Error::custom)
    }
}

/// One pending migration record.
///
/// `manifest_hash` and `manifest_datetime` are set only when the migration
/// completes; `error` only when it fails. Absent optional fields serialize
/// as `null` so "absent" stays distinguishable from "present but empty"
/// through round trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub status: WorkItemStatus,
    pub created_date: Option<DateTime<Utc>>,
    pub uuid: Uuid,
    pub many_hash: String,
    pub manifest_address: String,
    pub manifest_hash: Option<String>,
    pub manifest_datetime: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl WorkItem {
    /// Field-for-field equality excluding `status`, which may legitimately
    /// drift between `Claimed` and `Migrating` while a run is resumed.
    pub fn equal_ignoring_status(&self, other: &WorkItem) -> bool {
        self.created_date == other.created_date
            && self.uuid == other.uuid
            && self.many_hash == other.many_hash
            && self.manifest_address == other.manifest_address
            && self.manifest_hash == other.manifest_hash
            && self.manifest_datetime == other.manifest_datetime
            && self.error == other.error
    }
}

/// Pagination metadata returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub total_items: u64,
    pub item_count: u64,
    pub items_per_page: u64,
    pub total_pages: u64,
    pub current_page: u64,
}

/// List endpoint response: one page of work items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItems {
    pub items: Vec<WorkItem>,
    pub meta: Meta,
}

/// Body of a work-item update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemUpdateRequest {
    pub status: WorkItemStatus,
    pub manifest_datetime: Option<DateTime<Utc>>,
    pub manifest_hash: Option<String>,
    pub error: Option<String>,
}

/// Server echo of an applied update. Must match the submitted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemUpdateResponse {
    pub status: WorkItemStatus,
    pub manifest_datetime: Option<DateTime<Utc>>,
    pub manifest_hash: Option<String>,
    pub error: Option<String>,
}

/// Login request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Login response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors surfaced by the work-item store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network failure or persistent 5xx, already retried by the transport.
    #[error(transparent)]
    Transport(#[from] HttpError),

    /// The item is not in a claimable state and `force` was not set.
    /// Carries the server's message verbatim.
    #[error("work item not in the correct state to be claimed: {message}")]
    InvalidState { message: String },

    /// The server does not know the requested item.
    #[error("work item not found: {uuid}")]
    NotFound { uuid: Uuid },

    /// The claim endpoint answered 2xx but the returned item is not claimed.
    #[error("work item {uuid} not claimed, status is {status}")]
    ClaimRejected { uuid: Uuid, status: WorkItemStatus },

    /// The update echo does not match what was submitted.
    #[error("update of work item {uuid} rejected by the server: {detail}")]
    UpdateRejected { uuid: Uuid, detail: String },

    /// The server returned an item for a different UUID than requested.
    #[error("uuid mismatch: requested {requested}, received {received}")]
    UuidMismatch { requested: Uuid, received: Uuid },

    /// Login succeeded but no usable token came back.
    #[error("login returned an empty access token")]
    EmptyToken,

    /// Any other non-2xx answer.
    #[error("remote API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The response body could not be decoded as the expected type.
    #[error("failed to decode {context} response: {reason}")]
    Decode {
        context: &'static str,
        reason: String,
    },
}

// ============================================================================
// STORE CLIENT
// ============================================================================

/// Client for the remote work-item database, scoped to one neighborhood.
pub struct WorkItemStore {
    http: HttpClient,
    neighborhood: u64,
}

impl WorkItemStore {
    pub fn new(http: HttpClient, neighborhood: u64) -> Self {
        Self { http, neighborhood }
    }

    fn migrations_path(&self) -> String {
        format!("neighborhoods/{}/migrations", self.neighborhood)
    }

    fn migration_path(&self, uuid: Uuid) -> String {
        format!("neighborhoods/{}/migrations/{}", self.neighborhood, uuid)
    }

    fn claim_queue_path(&self) -> String {
        format!("neighborhoods/{}/migrations/claim/", self.neighborhood)
    }

    fn claim_uuid_path(&self, uuid: Uuid, force: bool) -> String {
        format!(
            "neighborhoods/{}/migrations/claim/{}?force={}",
            self.neighborhood, uuid, force
        )
    }

    /// Authenticates against the remote database and stores the bearer token
    /// on the transport for all subsequent calls.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let response = self.http.post_json("auth/login", credentials).await?;
        let response = Self::check_status(response, None).await?;
        let token: Token = Self::decode(response, "login").await?;

        if token.access_token.is_empty() {
            return Err(StoreError::EmptyToken);
        }

        self.http.set_bearer_token(token.access_token).await;
        Ok(())
    }

    /// Lists work items, optionally filtered by status, with pagination meta.
    pub async fn list(
        &self,
        status: Option<WorkItemStatus>,
    ) -> Result<WorkItems, StoreError> {
        let path = self.migrations_path();
        let response = match status {
            Some(status) => {
                let query = [("status", (status as u8).to_string())];
                self.http.get_query(&path, &query).await?
            }
            None => self.http.get(&path).await?,
        };
        let response = Self::check_status(response, None).await?;
        Self::decode(response, "work item list").await
    }

    /// Fetches a single work item by UUID.
    pub async fn get(&self, uuid: Uuid) -> Result<WorkItem, StoreError> {
        let response = self.http.get(&self.migration_path(uuid)).await?;
        let response = Self::check_status(response, Some(uuid)).await?;
        let item: WorkItem = Self::decode(response, "work item").await?;

        if item.uuid != uuid {
            return Err(StoreError::UuidMismatch {
                requested: uuid,
                received: item.uuid,
            });
        }

        Ok(item)
    }

    /// Atomically claims work items from the queue.
    ///
    /// The server performs the state transition; the returned items are
    /// already `Claimed`. An empty vector means no items were available,
    /// which is a success, not an error.
    pub async fn claim_from_queue(&self) -> Result<Vec<WorkItem>, StoreError> {
        let response = self.http.put(&self.claim_queue_path()).await?;
        let response = Self::check_status(response, None).await?;
        let items: Vec<WorkItem> = Self::decode(response, "claimed work items").await?;

        for item in &items {
            if item.status != WorkItemStatus::Claimed {
                return Err(StoreError::ClaimRejected {
                    uuid: item.uuid,
                    status: item.status,
                });
            }
        }

        Ok(items)
    }

    /// Atomically claims one work item by UUID.
    ///
    /// If the item is not in `Created` state and `force` is false, the server
    /// refuses with 409 and the error is surfaced as [`StoreError::InvalidState`].
    pub async fn claim_by_uuid(&self, uuid: Uuid, force: bool) -> Result<WorkItem, StoreError> {
        let response = self.http.put(&self.claim_uuid_path(uuid, force)).await?;
        let response = Self::check_status(response, Some(uuid)).await?;
        let item: WorkItem = Self::decode(response, "claimed work item").await?;

        if item.uuid != uuid {
            return Err(StoreError::UuidMismatch {
                requested: uuid,
                received: item.uuid,
            });
        }
        if item.status != WorkItemStatus::Claimed {
            return Err(StoreError::ClaimRejected {
                uuid,
                status: item.status,
            });
        }

        Ok(item)
    }

    /// Updates a work item to `status`, carrying the item's side fields
    /// (destination hash, confirmation time, error text).
    ///
    /// The server echoes the applied fields; any divergence from what was
    /// submitted is a hard [`StoreError::UpdateRejected`], never silently
    /// accepted.
    pub async fn update(
        &self,
        item: &WorkItem,
        status: WorkItemStatus,
    ) -> Result<WorkItemUpdateResponse, StoreError> {
        let request = WorkItemUpdateRequest {
            status,
            manifest_datetime: item.manifest_datetime,
            manifest_hash: item.manifest_hash.clone(),
            error: item.error.clone(),
        };

        let response = self
            .http
            .put_json(&self.migration_path(item.uuid), &request)
            .await?;
        let response = Self::check_status(response, Some(item.uuid)).await?;
        let echo: WorkItemUpdateResponse = Self::decode(response, "work item update").await?;

        if echo.status != request.status {
            return Err(StoreError::UpdateRejected {
                uuid: item.uuid,
                detail: format!("status echo is {}, submitted {}", echo.status, request.status),
            });
        }
        if echo.manifest_hash != request.manifest_hash
            || echo.manifest_datetime != request.manifest_datetime
            || echo.error != request.error
        {
            return Err(StoreError::UpdateRejected {
                uuid: item.uuid,
                detail: "echoed fields do not match the submitted update".to_string(),
            });
        }

        tracing::debug!(uuid = %item.uuid, status = %status, "work item updated");
        Ok(echo)
    }

    /// Fetches the list of source addresses authorized to migrate.
    /// This endpoint lives at the API root, outside the neighborhood scope.
    pub async fn whitelist(&self) -> Result<Vec<String>, StoreError> {
        let response = self.http.get("migrations-whitelist").await?;
        let response = Self::check_status(response, None).await?;
        Self::decode(response, "migrations whitelist").await
    }

    /// Maps non-2xx responses onto the store error taxonomy.
    async fn check_status(
        response: Response,
        uuid: Option<Uuid>,
    ) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = Self::error_message(response).await;
        match (status, uuid) {
            (StatusCode::CONFLICT, _) => Err(StoreError::InvalidState { message }),
            (StatusCode::NOT_FOUND, Some(uuid)) => Err(StoreError::NotFound { uuid }),
            _ => Err(StoreError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }

    /// Extracts a human-readable message from an error response body.
    async fn error_message(response: Response) -> String {
        let body = response.text().await.unwrap_or_default();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
                return message.to_string();
            }
        }
        body
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: Response,
        context: &'static str,
    ) -> Result<T, StoreError> {
        response.json().await.map_err(|err| StoreError::Decode {
            context,
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem {
            status: WorkItemStatus::Created,
            created_date: Some("2024-03-01T16:54:02.651Z".parse().unwrap()),
            uuid: Uuid::parse_str("5aa19d2a-4bdf-4687-a850-1804756b3f1f").unwrap(),
            many_hash: "d1e60bf3bbbe497448498f942d340b872a89046854827dc43dd703ccbf7a8c78"
                .to_string(),
            manifest_address: "manifest1jjzy5en2000728mzs3wn86a6u6jpygzajj2fg2".to_string(),
            manifest_hash: None,
            manifest_datetime: None,
            error: None,
        }
    }

    #[test]
    fn status_serializes_as_integer_code() {
        assert_eq!(
            serde_json::to_string(&WorkItemStatus::Migrating).unwrap(),
            "3"
        );
        let status: WorkItemStatus = serde_json::from_str("5").unwrap();
        assert_eq!(status, WorkItemStatus::Failed);
        assert!(serde_json::from_str::<WorkItemStatus>("6").is_err());
        assert!(serde_json::from_str::<WorkItemStatus>("0").is_err());
    }

    #[test]
    fn status_displays_lowercase_name() {
        assert_eq!(WorkItemStatus::Created.to_string(), "created");
        assert_eq!(WorkItemStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn work_item_uses_camel_case_and_explicit_nulls() {
        let json = serde_json::to_value(item()).unwrap();
        assert_eq!(json["status"], 1);
        assert_eq!(json["manyHash"].as_str().unwrap().len(), 64);
        assert!(json["manifestHash"].is_null());
        assert!(json["manifestDatetime"].is_null());
        assert!(json["error"].is_null());
        assert_eq!(json["createdDate"], "2024-03-01T16:54:02.651Z");
    }

    #[test]
    fn work_item_round_trips() {
        let original = item();
        let json = serde_json::to_string(&original).unwrap();
        let decoded: WorkItem = serde_json::from_str(&json).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn equality_ignores_only_status() {
        let a = item();
        let mut b = a.clone();
        b.status = WorkItemStatus::Migrating;
        assert!(a.equal_ignoring_status(&b));

        b.many_hash = "deadbeef".to_string();
        assert!(!a.equal_ignoring_status(&b));
    }

    #[test]
    fn in_flight_statuses() {
        assert!(WorkItemStatus::Claimed.is_in_flight());
        assert!(WorkItemStatus::Migrating.is_in_flight());
        assert!(!WorkItemStatus::Created.is_in_flight());
        assert!(!WorkItemStatus::Completed.is_in_flight());
        assert!(!WorkItemStatus::Failed.is_in_flight());
    }
}
