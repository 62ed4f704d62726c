/// Admin endpoints: user management and global share listing
use super::{extract::StrictJson, method_not_allowed};
use crate::{
    auth::AdminUser,
    context::AppContext,
    error::{ApiError, ApiResult},
    store::{Share, User},
};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/users", get(list_users).fallback(method_not_allowed))
        .route(
            "/admin/users/:sub",
            get(get_user).put(set_admin).fallback(method_not_allowed),
        )
        .route("/admin/shares", get(list_shares).fallback(method_not_allowed))
        .route("/admin/shares/:id", get(get_share).fallback(method_not_allowed))
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub q: String,
    /// Lenient: anything unparsable means the default
    #[serde(default)]
    pub limit: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAdminResponse {
    pub sub: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminShareItem {
    pub id: String,
    pub name: String,
    pub owner_sub: String,
    pub owner_name: String,
    pub owner_email: String,
    pub team_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// GET /api/admin/users
async fn list_users(
    State(ctx): State<AppContext>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<User>>> {
    let users = ctx
        .users
        .list_users(&query.q, query.limit.trim().parse().unwrap_or(0))
        .await
        .map_err(ApiError::read("could not list users"))?;
    Ok(Json(users))
}

/// GET /api/admin/users/:sub
async fn get_user(
    State(ctx): State<AppContext>,
    AdminUser(_admin): AdminUser,
    Path(sub): Path<String>,
) -> ApiResult<Json<User>> {
    let user = ctx
        .users
        .get_user(&sub)
        .await
        .map_err(ApiError::read("could not read user"))?;
    Ok(Json(user))
}

/// PUT /api/admin/users/:sub
async fn set_admin(
    State(ctx): State<AppContext>,
    Path(sub): Path<String>,
    headers: HeaderMap,
    StrictJson(req): StrictJson<SetAdminRequest>,
) -> ApiResult<Json<SetAdminResponse>> {
    let now = Utc::now();
    let admin = ctx.gate.require_admin(&headers, now).await?;

    ctx.users
        .set_admin(&sub, req.is_admin, now)
        .await
        .map_err(ApiError::update("could not update user"))?;

    info!("Admin {} set isAdmin={} for {}", admin.sub, req.is_admin, sub);
    Ok(Json(SetAdminResponse {
        sub,
        is_admin: req.is_admin,
    }))
}

/// GET /api/admin/shares
async fn list_shares(
    State(ctx): State<AppContext>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Json<Vec<AdminShareItem>>> {
    let shares = ctx
        .shares
        .list_all(1000)
        .await
        .map_err(ApiError::read("could not list shares"))?;

    let mut subs: Vec<String> = shares
        .iter()
        .filter(|s| !s.owner_sub.is_empty())
        .map(|s| s.owner_sub.clone())
        .collect();
    subs.sort();
    subs.dedup();

    let owners: HashMap<String, User> = ctx
        .users
        .get_users_by_subs(&subs)
        .await
        .map_err(ApiError::read("could not read users"))?
        .into_iter()
        .map(|u| (u.sub.clone(), u))
        .collect();

    let items = shares
        .into_iter()
        .map(|s| {
            let owner = owners.get(&s.owner_sub);
            AdminShareItem {
                owner_name: owner.map(|u| u.name.clone()).unwrap_or_default(),
                owner_email: owner.map(|u| u.email.clone()).unwrap_or_default(),
                id: s.id,
                name: s.name,
                owner_sub: s.owner_sub,
                team_id: s.team_id,
                created_at: s.created_at,
                updated_at: s.updated_at,
            }
        })
        .collect();

    Ok(Json(items))
}

/// GET /api/admin/shares/:id
async fn get_share(
    State(ctx): State<AppContext>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Share>> {
    let share = ctx
        .shares
        .get_share(&id)
        .await
        .map_err(ApiError::read("could not read share"))?;
    Ok(Json(share))
}
