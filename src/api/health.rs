/// Liveness probe and the browser runtime configuration script
use super::method_not_allowed;
use crate::{context::AppContext, db, error::ApiError};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Routes mounted under `/api`
pub fn routes() -> Router<AppContext> {
    Router::new().route("/healthz", get(healthz).fallback(method_not_allowed))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// GET /api/healthz
async fn healthz(State(ctx): State<AppContext>) -> Result<Json<HealthResponse>, ApiError> {
    match tokio::time::timeout(HEALTH_TIMEOUT, db::test_connection(&ctx.db)).await {
        Ok(Ok(())) => Ok(Json(HealthResponse { ok: true })),
        Ok(Err(e)) => {
            warn!("Health check failed: {}", e);
            Err(ApiError::Unhealthy)
        }
        Err(_) => {
            warn!("Health check timed out after {:?}", HEALTH_TIMEOUT);
            Err(ApiError::Unhealthy)
        }
    }
}

#[derive(Debug, Serialize)]
struct RuntimeConfigScript<'a> {
    #[serde(rename = "VITE_OIDC_ISSUER_URL")]
    issuer_url: &'a str,
    #[serde(rename = "VITE_OIDC_CLIENT_ID")]
    client_id: &'a str,
    #[serde(rename = "VITE_OIDC_AUDIENCE")]
    audience: String,
    #[serde(rename = "VITE_OIDC_SCOPE")]
    scope: &'a str,
    #[serde(rename = "VITE_OIDC_SILENT_REDIRECT_URI")]
    silent_redirect_uri: &'a str,
    #[serde(rename = "VITE_OIDC_USE_REFRESH_TOKEN")]
    use_refresh_token: &'a str,
    #[serde(rename = "VITE_OIDC_RENEW_SKEW_SECONDS")]
    renew_skew_seconds: &'a str,
}

/// GET /runtime-config.js
///
/// Public OIDC client settings for the frontend. Never includes secrets.
pub async fn runtime_config(State(ctx): State<AppContext>) -> impl IntoResponse {
    let oidc = ctx.config.auth.oidc.as_ref();
    let runtime = &ctx.config.runtime;

    let script = RuntimeConfigScript {
        issuer_url: oidc.map(|o| o.issuer_url.as_str()).unwrap_or_default(),
        client_id: oidc.map(|o| o.client_id.as_str()).unwrap_or_default(),
        audience: oidc.map(|o| o.audiences.join(",")).unwrap_or_default(),
        scope: &runtime.oidc_scope,
        silent_redirect_uri: &runtime.silent_redirect_uri,
        use_refresh_token: &runtime.use_refresh_token,
        renew_skew_seconds: &runtime.renew_skew_seconds,
    };

    let json = serde_json::to_string(&script).unwrap_or_else(|_| "{}".to_string());
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        format!("window.__EDS_RUNTIME_CONFIG={json};\n"),
    )
}
