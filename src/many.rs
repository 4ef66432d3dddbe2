//! MANY Ledger Transaction Module
//!
//! Looks up the source transaction referenced by a work item and validates
//! that it is an authentic migration: sent to the network's burn address,
//! carrying the work item UUID and the destination address in its memo, with
//! an amount that survives the precision conversion.
//!
//! The remote lookup returns one of two payload shapes behind a `method`
//! tag: a direct transfer (`ledger.send`) or a transfer submitted through a
//! multisig account (`account.multisigSubmitTransaction`). Both normalize
//! into a single [`SourceTxInfo`] through one explicit match; any other
//! method is a hard error.

use ethereum_types::U256;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::http::{HttpClient, HttpError};
use crate::tokens::{DESTINATION_PRECISION, SOURCE_PRECISION};

/// The source network's illegal address. Tokens sent here are provably
/// unspendable, which is what makes the transfer a migration burn.
pub const ILLEGAL_ADDR: &str = "maiyg";

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Raw lookup response: a method tag plus an argument payload whose shape
/// depends on the method.
#[derive(Debug, Deserialize)]
struct TxInfoRaw {
    method: String,
    argument: serde_json::Value,
}

/// Transfer arguments common to both method shapes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceTxInfo {
    pub from: String,
    pub to: String,
    /// Decimal string; source amounts may exceed 64 bits.
    pub amount: String,
    pub symbol: String,
    #[serde(default)]
    pub memo: Vec<String>,
}

/// `account.multisigSubmitTransaction` nests the transfer one level down.
#[derive(Debug, Deserialize)]
struct MultisigTransaction {
    argument: SourceTxInfo,
}

#[derive(Debug, Deserialize)]
struct MultisigSubmitArguments {
    transaction: MultisigTransaction,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ManyError {
    #[error(transparent)]
    Transport(#[from] HttpError),

    #[error("transaction lookup failed (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unsupported MANY tx method: {method}")]
    UnsupportedMethod { method: String },

    #[error("error decoding {method} tx arguments: {reason}")]
    Decode { method: String, reason: String },
}

/// Authenticity check failures, in the order the checks run.
/// All checks are pure; they never mutate the work item.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid MANY tx `to` address: {to}")]
    InvalidDestination { to: String },

    #[error("invalid MANY tx memo length: {len}")]
    InvalidMemo { len: usize },

    #[error("MANY tx UUID {found:?} does not match work item UUID {expected}")]
    UuidMismatch { found: String, expected: Uuid },

    #[error("invalid manifest destination address: {found} (expected {expected})")]
    AddressMismatch { found: String, expected: String },

    #[error("invalid MANY tx amount: {amount:?}")]
    InvalidAmount { amount: String },

    #[error("amount {amount} is below the migration minimum of {minimum} base units")]
    AmountTooSmall { amount: String, minimum: u64 },
}

// ============================================================================
// LOOKUP CLIENT
// ============================================================================

/// Client for the source ledger transaction lookup endpoint.
pub struct ManyClient {
    http: HttpClient,
    neighborhood: u64,
}

impl ManyClient {
    pub fn new(http: HttpClient, neighborhood: u64) -> Self {
        Self { http, neighborhood }
    }

    /// Fetches the source transaction by hash and normalizes its arguments.
    pub async fn tx_info(&self, hash: &str) -> Result<SourceTxInfo, ManyError> {
        let path = format!("neighborhoods/{}/transactions/{}", self.neighborhood, hash);
        let response = self.http.get(&path).await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ManyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let raw: TxInfoRaw = response.json().await.map_err(|err| ManyError::Decode {
            method: "unknown".to_string(),
            reason: err.to_string(),
        })?;

        normalize(raw)
    }
}

/// Resolves the tagged payload into transfer arguments.
fn normalize(raw: TxInfoRaw) -> Result<SourceTxInfo, ManyError> {
    match raw.method.as_str() {
        "ledger.send" => {
            serde_json::from_value(raw.argument).map_err(|err| ManyError::Decode {
                method: raw.method,
                reason: err.to_string(),
            })
        }
        "account.multisigSubmitTransaction" => {
            let args: MultisigSubmitArguments =
                serde_json::from_value(raw.argument).map_err(|err| ManyError::Decode {
                    method: raw.method,
                    reason: err.to_string(),
                })?;
            Ok(args.transaction.argument)
        }
        _ => Err(ManyError::UnsupportedMethod { method: raw.method }),
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Smallest source amount that does not vanish in the precision conversion.
fn minimum_amount() -> u64 {
    10u64.pow(SOURCE_PRECISION - DESTINATION_PRECISION)
}

/// Validates the source transaction against the work item it is supposed to
/// authorize. Checks run in order and stop at the first failure.
pub fn validate(
    info: &SourceTxInfo,
    expected_uuid: Uuid,
    expected_destination: &str,
) -> Result<(), ValidationError> {
    if info.to != ILLEGAL_ADDR {
        return Err(ValidationError::InvalidDestination {
            to: info.to.clone(),
        });
    }

    if info.memo.len() != 2 {
        return Err(ValidationError::InvalidMemo {
            len: info.memo.len(),
        });
    }

    let tx_uuid = Uuid::parse_str(&info.memo[0]).map_err(|_| ValidationError::UuidMismatch {
        found: info.memo[0].clone(),
        expected: expected_uuid,
    })?;
    if tx_uuid != expected_uuid {
        return Err(ValidationError::UuidMismatch {
            found: info.memo[0].clone(),
            expected: expected_uuid,
        });
    }

    if info.memo[1] != expected_destination {
        return Err(ValidationError::AddressMismatch {
            found: info.memo[1].clone(),
            expected: expected_destination.to_string(),
        });
    }

    let amount = U256::from_dec_str(&info.amount).map_err(|_| ValidationError::InvalidAmount {
        amount: info.amount.clone(),
    })?;
    let minimum = minimum_amount();
    if amount < U256::from(minimum) {
        return Err(ValidationError::AmountTooSmall {
            amount: info.amount.clone(),
            minimum,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const UUID: &str = "5aa19d2a-4bdf-4687-a850-1804756b3f1f";
    const DESTINATION: &str = "manifest1jjzy5en2000728mzs3wn86a6u6jpygzajj2fg2";

    fn info() -> SourceTxInfo {
        SourceTxInfo {
            from: "maffbahksdwaqeenayy2gxke32hgb7aq4ao4wt745lsfs6wijp".to_string(),
            to: ILLEGAL_ADDR.to_string(),
            amount: "1000".to_string(),
            symbol: "mfx".to_string(),
            memo: vec![UUID.to_string(), DESTINATION.to_string()],
        }
    }

    fn expected_uuid() -> Uuid {
        Uuid::parse_str(UUID).unwrap()
    }

    #[test]
    fn accepts_a_valid_migration_transfer() {
        assert_eq!(validate(&info(), expected_uuid(), DESTINATION), Ok(()));
    }

    #[test]
    fn rejects_wrong_destination() {
        let mut info = info();
        info.to = "maffbahksdwaqeenayy2gxke32hgb7aq4ao4wt745lsfs6wijp".to_string();
        assert!(matches!(
            validate(&info, expected_uuid(), DESTINATION),
            Err(ValidationError::InvalidDestination { .. })
        ));
    }

    #[test]
    fn rejects_wrong_memo_length() {
        let mut info = info();
        info.memo.pop();
        assert_eq!(
            validate(&info, expected_uuid(), DESTINATION),
            Err(ValidationError::InvalidMemo { len: 1 })
        );
    }

    #[test]
    fn rejects_unparseable_memo_uuid() {
        let mut info = info();
        info.memo[0] = "not-a-uuid".to_string();
        assert!(matches!(
            validate(&info, expected_uuid(), DESTINATION),
            Err(ValidationError::UuidMismatch { .. })
        ));
    }

    #[test]
    fn rejects_mismatched_memo_uuid() {
        let mut info = info();
        info.memo[0] = "00000000-0000-4000-8000-000000000000".to_string();
        assert!(matches!(
            validate(&info, expected_uuid(), DESTINATION),
            Err(ValidationError::UuidMismatch { .. })
        ));
    }

    #[test]
    fn rejects_mismatched_destination_address() {
        let mut info = info();
        info.memo[1] = "manifest1other".to_string();
        assert!(matches!(
            validate(&info, expected_uuid(), DESTINATION),
            Err(ValidationError::AddressMismatch { .. })
        ));
    }

    #[test]
    fn rejects_non_integer_amount() {
        let mut info = info();
        info.amount = "ten".to_string();
        assert!(matches!(
            validate(&info, expected_uuid(), DESTINATION),
            Err(ValidationError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn rejects_dust_amount() {
        let mut info = info();
        info.amount = "999".to_string();
        assert_eq!(
            validate(&info, expected_uuid(), DESTINATION),
            Err(ValidationError::AmountTooSmall {
                amount: "999".to_string(),
                minimum: 1000,
            })
        );
    }

    #[test]
    fn normalizes_direct_transfer() {
        let raw = TxInfoRaw {
            method: "ledger.send".to_string(),
            argument: json!({
                "from": "maffbahksdwaqeenayy2gxke32hgb7aq4ao4wt745lsfs6wijp",
                "to": ILLEGAL_ADDR,
                "amount": "1000",
                "symbol": "mfx",
                "memo": [UUID, DESTINATION],
            }),
        };
        assert_eq!(normalize(raw).unwrap(), info());
    }

    #[test]
    fn normalizes_multisig_submitted_transfer() {
        let raw = TxInfoRaw {
            method: "account.multisigSubmitTransaction".to_string(),
            argument: json!({
                "transaction": {
                    "argument": {
                        "from": "maffbahksdwaqeenayy2gxke32hgb7aq4ao4wt745lsfs6wijp",
                        "to": ILLEGAL_ADDR,
                        "amount": "1000",
                        "symbol": "mfx",
                        "memo": [UUID, DESTINATION],
                    }
                }
            }),
        };
        assert_eq!(normalize(raw).unwrap(), info());
    }

    #[test]
    fn rejects_unknown_method() {
        let raw = TxInfoRaw {
            method: "ledger.burn".to_string(),
            argument: json!({}),
        };
        assert!(matches!(
            normalize(raw),
            Err(ManyError::UnsupportedMethod { method }) if method == "ledger.burn"
        ));
    }
}
