//! JCS (JSON Canonicalization Scheme) back-end.

use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// Convert a JSON value to JCS (RFC 8785) bytes.
///
/// Object keys are sorted by UTF-16 code units, no whitespace is emitted and
/// numbers use the ECMAScript representation.
pub fn to_canonical_jcs_bytes(value: &Value) -> CoreResult<Vec<u8>> {
    serde_jcs::to_vec(value).map_err(|e| CoreError::Serialization {
        message: e.to_string(),
    })
}
