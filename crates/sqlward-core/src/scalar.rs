//! Typed integer scalars for the request boundary.
//!
//! Transport input arrives as JSON. Each scalar kind has its own parser that
//! accepts a JSON number or a numeric string and rejects anything outside the
//! target type's range instead of wrapping or truncating.

use serde_json::Value;
use thiserror::Error;

use crate::error::{Classify, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScalarError {
    #[error("{kind} must be an integer, got {got}")]
    NotAnInteger { kind: &'static str, got: String },

    #[error("{kind} out of range: {value}")]
    OutOfRange { kind: &'static str, value: i128 },
}

impl Classify for ScalarError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Precondition
    }
}

/// Widen any JSON integer (or integer string) to `i128` so every target
/// range can be checked without overflow.
fn integral(value: &Value, kind: &'static str) -> Result<i128, ScalarError> {
    let not_integer = || ScalarError::NotAnInteger {
        kind,
        got: value.to_string(),
    };
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok(i128::from(u))
            } else if let Some(i) = n.as_i64() {
                Ok(i128::from(i))
            } else {
                Err(not_integer())
            }
        }
        Value::String(s) => s.trim().parse::<i128>().map_err(|_| not_integer()),
        _ => Err(not_integer()),
    }
}

macro_rules! scalar {
    ($parse:ident, $ty:ty, $kind:literal) => {
        #[doc = concat!("Parse a `", $kind, "` scalar.")]
        pub fn $parse(value: &Value) -> Result<$ty, ScalarError> {
            let n = integral(value, $kind)?;
            <$ty>::try_from(n).map_err(|_| ScalarError::OutOfRange {
                kind: $kind,
                value: n,
            })
        }
    };
}

scalar!(parse_u8, u8, "UInt8");
scalar!(parse_u16, u16, "UInt16");
scalar!(parse_u32, u32, "UInt32");
scalar!(parse_u64, u64, "UInt64");
scalar!(parse_i8, i8, "Int8");
scalar!(parse_i16, i16, "Int16");
scalar!(parse_i32, i32, "Int32");
scalar!(parse_i64, i64, "Int64");

/// Serialize an unsigned 64-bit scalar. Values above 2^53 lose precision in
/// JavaScript clients, so they are emitted as strings.
pub fn serialize_u64(value: u64) -> Value {
    const MAX_SAFE: u64 = (1 << 53) - 1;
    if value > MAX_SAFE {
        Value::String(value.to_string())
    } else {
        Value::from(value)
    }
}

/// Serialize a signed 64-bit scalar with the same safe-integer rule.
pub fn serialize_i64(value: i64) -> Value {
    const MAX_SAFE: u64 = (1 << 53) - 1;
    if value.unsigned_abs() > MAX_SAFE {
        Value::String(value.to_string())
    } else {
        Value::from(value)
    }
}
