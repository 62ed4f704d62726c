/// Credential handling: bearer tokens, session cookies, the shared secret
/// and the per-request authorization gate.

pub mod gate;
pub mod oidc;
pub mod secret;

pub use gate::{AuthStrategy, AuthorizationGate, IssuedSession, ShareAccess};
pub use oidc::{HttpKeySource, OidcVerifier};
pub use secret::SharedSecret;

use crate::{config::SessionConfig, context::AppContext, error::ApiError};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderName},
};
use axum_extra::{
    extract::cookie::{Cookie, SameSite},
    headers::{Cookie as CookieHeader, HeaderMapExt},
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use time::OffsetDateTime;

/// Identity asserted by a verified bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub sub: String,
    pub email: String,
    pub name: String,
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Session token from the configured cookie, if present
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let cookies = headers.typed_get::<CookieHeader>()?;
    cookies
        .get(cookie_name)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Unguessable session token
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(43)
        .map(char::from)
        .collect()
}

/// `Set-Cookie` header carrying a freshly issued session
pub fn session_cookie(config: &SessionConfig, issued: &IssuedSession) -> [(HeaderName, String); 1] {
    let max_age = (issued.expires_at - Utc::now()).num_seconds().max(0);
    let cookie = Cookie::build((config.cookie_name.clone(), issued.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(time::Duration::seconds(max_age))
        .expires(OffsetDateTime::from_unix_timestamp(issued.expires_at.timestamp()).ok())
        .build();
    [(header::SET_COOKIE, cookie.to_string())]
}

/// Authenticated OIDC user
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppContext> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let identity = state.gate.require_user(&parts.headers, Utc::now()).await?;
        Ok(CurrentUser(identity))
    }
}

/// Authenticated OIDC user whose admin flag is currently set
#[derive(Debug, Clone)]
pub struct AdminUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppContext> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let identity = state.gate.require_admin(&parts.headers, Utc::now()).await?;
        Ok(AdminUser(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Duration;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_session_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; eds_session=tok123"),
        );
        assert_eq!(session_token(&headers, "eds_session").as_deref(), Some("tok123"));
        assert_eq!(session_token(&headers, "other"), None);
    }

    #[test]
    fn test_generate_token_is_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let mut config = crate::config::ServerConfig::default().session;
        let issued = IssuedSession {
            token: "tok".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };

        let [(name, value)] = session_cookie(&config, &issued);
        assert_eq!(name, header::SET_COOKIE);
        let cookie = Cookie::parse(value).unwrap();
        assert_eq!(cookie.name(), "eds_session");
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_ne!(cookie.secure(), Some(true));
        let max_age = cookie.max_age().unwrap().whole_seconds();
        assert!((3590..=3600).contains(&max_age));
        assert_eq!(
            cookie.expires_datetime().unwrap().unix_timestamp(),
            issued.expires_at.timestamp()
        );

        config.cookie_secure = true;
        let [(_, value)] = session_cookie(&config, &issued);
        assert_eq!(Cookie::parse(value).unwrap().secure(), Some(true));
    }
}
