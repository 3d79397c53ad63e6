//! API response types.

use serde::Serialize;

use crate::publish::PointValue;

/// One state point.
#[derive(Debug, Serialize)]
pub struct StateEntry {
    pub key: String,
    pub value: PointValue,
}

/// Error body returned with 4xx/5xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
