pub mod genres;
pub mod health;
pub mod metrics;
pub mod reservations;
pub mod stalls;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;

/// Parses a UUID path segment.
pub(crate) fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {what} id: {e}")))
}

/// Plain acknowledgement body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
