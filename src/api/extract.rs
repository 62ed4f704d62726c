/// Size-capped JSON body extraction
use crate::{context::AppContext, error::ApiError};
use axum::{
    async_trait,
    body::to_bytes,
    extract::{FromRequest, Request},
    http::header::CONTENT_LENGTH,
};
use serde::de::DeserializeOwned;

/// JSON body read under the configured byte cap.
///
/// The size check happens before any parsing: an oversized body is
/// `payload_too_large` whatever it contains. Request types are expected to
/// use `deny_unknown_fields`, so unknown fields surface as `bad_json`.
#[derive(Debug)]
pub struct StrictJson<T>(pub T);

#[async_trait]
impl<T> FromRequest<AppContext> for StrictJson<T>
where
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppContext) -> Result<Self, Self::Rejection> {
        let limit = state.config.service.max_body_bytes;

        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(ApiError::PayloadTooLarge);
        }

        let bytes = to_bytes(req.into_body(), limit)
            .await
            .map_err(|_| ApiError::PayloadTooLarge)?;

        serde_json::from_slice(&bytes)
            .map(StrictJson)
            .map_err(|_| ApiError::BadJson)
    }
}

/// Diagram payloads are tagged by their first three bytes
pub fn check_schema(schema: &str) -> Result<(), ApiError> {
    if schema.is_empty() {
        return Err(ApiError::MissingSchema);
    }
    if !(schema.starts_with("EDS") || schema.starts_with("TXT")) {
        return Err(ApiError::InvalidSchema);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_schema() {
        assert!(check_schema("EDS0040000eJxLz").is_ok());
        assert!(check_schema("TXT{}").is_ok());
        assert_eq!(check_schema("").unwrap_err().code(), "missing_schema");
        assert_eq!(check_schema("eds").unwrap_err().code(), "invalid_schema");
        assert_eq!(check_schema(" EDS").unwrap_err().code(), "invalid_schema");
    }
}
