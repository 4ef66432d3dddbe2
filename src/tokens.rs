//! Token mapping and amount precision conversion.
//!
//! The source ledger records amounts with 9 decimal places, the destination
//! chain with 6. Conversion scales the integer amount by a power of ten and
//! must never lose or fabricate value silently: a result that rounds to zero
//! is rejected before any transfer is attempted.

use std::collections::HashMap;

use ethereum_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decimal places used by the source (MANY) ledger.
pub const SOURCE_PRECISION: u32 = 9;

/// Decimal places used by the destination (Manifest) chain.
pub const DESTINATION_PRECISION: u32 = 6;

/// Destination denomination and precision for one source token symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Destination chain denomination, e.g. "umfx".
    pub denom: String,
    /// Destination decimal precision.
    pub precision: u32,
}

/// Source token symbol to destination token info.
pub type TokenMap = HashMap<String, TokenInfo>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrecisionError {
    #[error("invalid precision: {0}")]
    InvalidPrecision(u32),

    #[error("current precision is equal to target precision: {0}")]
    NoOp(u32),

    #[error("error parsing integer amount: {0:?}")]
    ParseAmount(String),

    #[error("amount overflow while scaling {amount} by 10^{exponent}")]
    Overflow { amount: String, exponent: u32 },

    #[error("amount after conversion is less than or equal to 0: {0:?}")]
    NonPositive(String),
}

/// Adjusts the precision of an integer amount given as a decimal string.
///
/// Increasing precision multiplies by `10^(target - current)`; decreasing
/// divides (truncating). A zero result, an equal source/target precision,
/// or a non-decimal input are all rejected.
pub fn convert_precision(
    amount: &str,
    current_precision: u32,
    target_precision: u32,
) -> Result<U256, PrecisionError> {
    if current_precision < 1 {
        return Err(PrecisionError::InvalidPrecision(current_precision));
    }
    if target_precision < 1 {
        return Err(PrecisionError::InvalidPrecision(target_precision));
    }
    if current_precision == target_precision {
        return Err(PrecisionError::NoOp(current_precision));
    }

    let amount_int = U256::from_dec_str(amount)
        .map_err(|_| PrecisionError::ParseAmount(amount.to_string()))?;

    let exponent = current_precision.abs_diff(target_precision);
    let multiplier = U256::from(10u8)
        .checked_pow(U256::from(exponent))
        .ok_or(PrecisionError::Overflow {
            amount: amount.to_string(),
            exponent,
        })?;

    let result = if target_precision > current_precision {
        amount_int
            .checked_mul(multiplier)
            .ok_or(PrecisionError::Overflow {
                amount: amount.to_string(),
                exponent,
            })?
    } else {
        // Integer division truncates; a sub-unit remainder is dust.
        amount_int / multiplier
    };

    if result.is_zero() {
        return Err(PrecisionError::NonPositive(amount.to_string()));
    }

    Ok(result)
}
