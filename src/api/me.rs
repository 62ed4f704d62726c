/// Caller identity endpoint
use super::method_not_allowed;
use crate::{
    auth::CurrentUser,
    context::AppContext,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/me", get(me).fallback(method_not_allowed))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

/// GET /api/me
async fn me(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<MeResponse>> {
    let is_admin = ctx
        .users
        .is_admin(&user.sub)
        .await
        .map_err(ApiError::read("could not read user"))?;

    Ok(Json(MeResponse {
        sub: user.sub,
        email: user.email,
        name: user.name,
        is_admin,
    }))
}
