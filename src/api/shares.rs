/// Share endpoints
use super::{extract::check_schema, extract::StrictJson, method_not_allowed};
use crate::{
    auth::{session_cookie, CurrentUser, ShareAccess},
    context::AppContext,
    error::{ApiError, ApiResult},
    store::ShareSummary,
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/shares", post(create_share).fallback(method_not_allowed))
        .route("/shares/mine", get(list_my_shares).fallback(method_not_allowed))
        .route(
            "/shares/:id",
            get(get_share)
                .put(update_share)
                .delete(delete_share)
                .fallback(method_not_allowed),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateShareRequest {
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub team_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateShareResponse {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateShareRequest {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub schema: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub id: String,
    pub updated: bool,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: String,
    pub deleted: bool,
}

/// POST /api/shares
async fn create_share(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    StrictJson(req): StrictJson<CreateShareRequest>,
) -> ApiResult<Response> {
    check_schema(&req.schema)?;

    let now = Utc::now();
    let team_id = Some(req.team_id.trim()).filter(|t| !t.is_empty());
    let owner_sub = ctx
        .gate
        .authorize_create(&headers, &req.password, team_id, now)
        .await?;

    let id = Uuid::new_v4().to_string();
    ctx.shares
        .create_share(&id, req.name.trim(), &req.schema, &owner_sub, team_id, now)
        .await
        .map_err(ApiError::insert("could not store share"))?;

    record_version(&ctx, &id, &req.schema, &owner_sub, now).await;

    // Legacy callers get a session for the new share so follow-up edits
    // need no password.
    let issued = if ctx.gate.oidc_enabled() {
        None
    } else {
        ctx.gate.issue_session(&id, now).await
    };

    let base_url = req.base_url.trim();
    let url = if base_url.is_empty() {
        String::new()
    } else {
        format!("{base_url}#share={id}")
    };

    info!("Created share {}", id);
    Ok((
        StatusCode::CREATED,
        issued.map(|s| session_cookie(&ctx.config.session, &s)),
        Json(CreateShareResponse { id, url }),
    )
        .into_response())
}

/// GET /api/shares/:id
async fn get_share(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ShareResponse>> {
    let grant = ctx
        .gate
        .authorize_share(&headers, &id, ShareAccess::Read, None, Utc::now())
        .await?;
    let share = grant.share;

    Ok(Json(ShareResponse {
        id: share.id,
        name: share.name.trim().to_string(),
        schema: share.schema,
        updated_at: share.updated_at,
    }))
}

/// PUT /api/shares/:id
async fn update_share(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    StrictJson(req): StrictJson<UpdateShareRequest>,
) -> ApiResult<Response> {
    let schema = req.schema.filter(|s| !s.is_empty());
    if let Some(schema) = &schema {
        check_schema(schema)?;
    }
    let name = req.name.map(|n| n.trim().to_string());
    if schema.is_none() && name.is_none() {
        return Err(ApiError::MissingUpdate);
    }

    let now = Utc::now();
    let grant = ctx
        .gate
        .authorize_share(&headers, &id, ShareAccess::Write, Some(&req.password), now)
        .await?;

    ctx.shares
        .update_share(&id, schema.as_deref(), name.as_deref(), now)
        .await
        .map_err(ApiError::update("could not update share"))?;

    if let Some(schema) = &schema {
        record_version(&ctx, &id, schema, &grant.actor_sub, now).await;
    }

    Ok((
        grant.issued.map(|s| session_cookie(&ctx.config.session, &s)),
        Json(UpdatedResponse { id, updated: true }),
    )
        .into_response())
}

/// DELETE /api/shares/:id
async fn delete_share(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<DeletedResponse>> {
    ctx.gate
        .authorize_share(&headers, &id, ShareAccess::Delete, None, Utc::now())
        .await?;

    ctx.shares
        .delete_share(&id)
        .await
        .map_err(ApiError::delete("could not delete share"))?;

    info!("Deleted share {}", id);
    Ok(Json(DeletedResponse { id, deleted: true }))
}

/// GET /api/shares/mine
async fn list_my_shares(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<ShareSummary>>> {
    let shares = ctx
        .shares
        .list_by_owner(&user.sub, 200)
        .await
        .map_err(ApiError::read("could not list shares"))?;

    Ok(Json(shares))
}

/// Append a version and prune history. Best-effort: the write it follows
/// has already succeeded.
pub(crate) async fn record_version(
    ctx: &AppContext,
    share_id: &str,
    schema: &str,
    actor_sub: &str,
    now: DateTime<Utc>,
) {
    let version_id = Uuid::new_v4().to_string();
    if let Err(e) = ctx
        .shares
        .add_version(&version_id, share_id, schema, actor_sub, now)
        .await
    {
        warn!("Could not record version for share {}: {}", share_id, e);
        return;
    }

    if let Err(e) = ctx
        .shares
        .prune_versions(share_id, ctx.config.storage.share_versions_max)
        .await
    {
        warn!("Could not prune versions of share {}: {}", share_id, e);
    }
}
