//! Caller identity extraction.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{IdentityContext, Role};

use crate::error::ApiError;

/// Header carrying the authenticated user ID.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's role (`user` or `admin`).
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The identity of the caller, read once per request from the headers set
/// by the authenticating gateway.
#[derive(Debug, Clone)]
pub struct Caller(pub IdentityContext);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()))
            .map_err(|_| ApiError::BadRequest(format!("{name} header is not valid text"))),
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;

        let role = match header(parts, USER_ROLE_HEADER)? {
            None | Some("") => Role::default(),
            Some(raw) => raw
                .parse::<Role>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        };

        Ok(Caller(IdentityContext::new(user_id, role)))
    }
}
