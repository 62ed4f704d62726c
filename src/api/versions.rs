/// Share version history endpoints
use super::{method_not_allowed, shares::record_version};
use crate::{
    auth::ShareAccess,
    context::AppContext,
    error::{ApiError, ApiResult},
    store::ShareVersion,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/shares/:id/versions",
            get(list_versions).fallback(method_not_allowed),
        )
        .route(
            "/shares/:id/versions/:version_id",
            get(get_version).fallback(method_not_allowed),
        )
        .route(
            "/shares/:id/versions/:version_id/restore",
            post(restore_version).fallback(method_not_allowed),
        )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub share_id: String,
    pub version_id: String,
    pub schema: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredResponse {
    pub id: String,
    pub restored: bool,
    pub version_id: String,
}

/// GET /api/shares/:id/versions
async fn list_versions(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ShareVersion>>> {
    ctx.gate
        .authorize_share(&headers, &id, ShareAccess::History, None, Utc::now())
        .await?;

    let versions = ctx
        .shares
        .list_versions(&id, 200)
        .await
        .map_err(ApiError::read("could not list share versions"))?;

    Ok(Json(versions))
}

/// GET /api/shares/:id/versions/:version_id
async fn get_version(
    State(ctx): State<AppContext>,
    Path((id, version_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<VersionResponse>> {
    ctx.gate
        .authorize_share(&headers, &id, ShareAccess::History, None, Utc::now())
        .await?;

    let schema = ctx
        .shares
        .get_version(&id, &version_id)
        .await
        .map_err(ApiError::read("could not read share version"))?;

    Ok(Json(VersionResponse {
        share_id: id,
        version_id,
        schema,
    }))
}

/// POST /api/shares/:id/versions/:version_id/restore
///
/// Restoring overwrites the live schema and appends a new version, so the
/// history keeps growing instead of being rewound.
async fn restore_version(
    State(ctx): State<AppContext>,
    Path((id, version_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<RestoredResponse>> {
    let now = Utc::now();
    let grant = ctx
        .gate
        .authorize_share(&headers, &id, ShareAccess::History, None, now)
        .await?;

    let schema = ctx
        .shares
        .get_version(&id, &version_id)
        .await
        .map_err(ApiError::read("could not read share version"))?;

    ctx.shares
        .update_share(&id, Some(&schema), None, now)
        .await
        .map_err(ApiError::update("could not update share"))?;

    record_version(&ctx, &id, &schema, &grant.actor_sub, now).await;

    info!("Restored share {} to version {}", id, version_id);
    Ok(Json(RestoredResponse {
        id,
        restored: true,
        version_id,
    }))
}
