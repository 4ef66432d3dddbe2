//! Shared test helpers
//!
//! Fixture constants, work-item builders, a mock-server-backed store
//! constructor with collapsed retry delays, an update responder that echoes
//! the submitted fields, and a scriptable chain client.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethereum_types::U256;
use url::Url;
use uuid::Uuid;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

use mfx_migrator::chain::{ChainClient, TxResult};
use mfx_migrator::http::{HttpClient, RetryPolicy};
use mfx_migrator::localstate::LocalStateCache;
use mfx_migrator::many::{ManyClient, ILLEGAL_ADDR};
use mfx_migrator::store::{Credentials, WorkItem, WorkItemStatus, WorkItemStore};
use mfx_migrator::tokens::{TokenInfo, TokenMap};

pub const NEIGHBORHOOD: u64 = 2;
pub const DUMMY_UUID: &str = "5aa19d2a-4bdf-4687-a850-1804756b3f1f";
pub const DUMMY_MANY_HASH: &str =
    "d1e60bf3bbbe497448498f942d340b872a89046854827dc43dd703ccbf7a8c78";
pub const DUMMY_MANY_FROM: &str = "maffbahksdwaqeenayy2gxke32hgb7aq4ao4wt745lsfs6wijp";
pub const DUMMY_MANIFEST_ADDRESS: &str = "manifest1jjzy5en2000728mzs3wn86a6u6jpygzajj2fg2";
pub const DUMMY_SYMBOL: &str = "MFX";
pub const DUMMY_TX_HASH: &str =
    "9b2a1c0e44de7a5fd0cc54b31e8a3a7f2a50f2e36a3f0fbbd8d214e22b5e3f61";
pub const DUMMY_CREATED_DATE: &str = "2024-03-01T16:54:02.651Z";
pub const DUMMY_BLOCK_TIME: &str = "2024-03-02T10:00:00.123Z";

pub fn dummy_uuid() -> Uuid {
    Uuid::parse_str(DUMMY_UUID).unwrap()
}

pub fn created_date() -> DateTime<Utc> {
    DUMMY_CREATED_DATE.parse().unwrap()
}

pub fn block_time() -> DateTime<Utc> {
    DUMMY_BLOCK_TIME.parse().unwrap()
}

/// Builds a work item in the given status with the fixture fields.
pub fn work_item(status: WorkItemStatus) -> WorkItem {
    WorkItem {
        status,
        created_date: Some(created_date()),
        uuid: dummy_uuid(),
        many_hash: DUMMY_MANY_HASH.to_string(),
        manifest_address: DUMMY_MANIFEST_ADDRESS.to_string(),
        manifest_hash: None,
        manifest_datetime: None,
        error: None,
    }
}

pub fn work_item_json(status: WorkItemStatus) -> serde_json::Value {
    serde_json::to_value(work_item(status)).unwrap()
}

/// Source transaction lookup response for a valid migration transfer.
pub fn ledger_send_json(amount: &str) -> serde_json::Value {
    serde_json::json!({
        "method": "ledger.send",
        "argument": {
            "from": DUMMY_MANY_FROM,
            "to": ILLEGAL_ADDR,
            "amount": amount,
            "symbol": DUMMY_SYMBOL,
            "memo": [DUMMY_UUID, DUMMY_MANIFEST_ADDRESS],
        }
    })
}

pub fn credentials() -> Credentials {
    Credentials {
        username: "worker".to_string(),
        password: "hunter2".to_string(),
    }
}

/// Retry policy with collapsed delays so retry tests run instantly.
pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        base_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(5),
        request_timeout: std::time::Duration::from_secs(5),
    }
}

pub fn test_http(server: &MockServer) -> HttpClient {
    let url = Url::parse(&server.uri()).unwrap();
    HttpClient::with_policy(url, test_policy()).unwrap()
}

pub fn test_store(server: &MockServer) -> WorkItemStore {
    WorkItemStore::new(test_http(server), NEIGHBORHOOD)
}

pub fn test_many_client(server: &MockServer) -> ManyClient {
    ManyClient::new(test_http(server), NEIGHBORHOOD)
}

pub fn test_token_map() -> TokenMap {
    let mut map = TokenMap::new();
    map.insert(
        DUMMY_SYMBOL.to_string(),
        TokenInfo {
            denom: "umfx".to_string(),
            precision: 6,
        },
    );
    map
}

/// Fresh state directory under the system temp dir, unique per test.
pub fn temp_state_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mfx-migrator-test-{:016x}", rand::random::<u64>()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn temp_cache() -> LocalStateCache {
    LocalStateCache::new(temp_state_dir())
}

/// Update responder that echoes the submitted fields back, the way a
/// well-behaved work-item server applies an update.
pub struct EchoUpdateResponder;

impl Respond for EchoUpdateResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("update request body is JSON");
        ResponseTemplate::new(200).set_body_json(body)
    }
}

/// Scriptable destination chain client recording every transfer call.
pub struct MockChainClient {
    failure: Option<String>,
    pub calls: Mutex<Vec<(String, U256, String, String)>>,
}

impl MockChainClient {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn transfer(
        &self,
        to: &str,
        amount: U256,
        denom: &str,
        memo: &str,
    ) -> anyhow::Result<TxResult> {
        self.calls.lock().unwrap().push((
            to.to_string(),
            amount,
            denom.to_string(),
            memo.to_string(),
        ));

        match &self.failure {
            Some(reason) => anyhow::bail!("{reason}"),
            None => Ok(TxResult {
                tx_hash: DUMMY_TX_HASH.to_string(),
                block_time: block_time(),
            }),
        }
    }
}
