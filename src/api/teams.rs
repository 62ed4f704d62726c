/// Team, membership and invite endpoints (OIDC only)
///
/// Handlers that take a body authenticate after it has been read and
/// validated.
use super::{extract::StrictJson, method_not_allowed};
use crate::{
    auth::CurrentUser,
    context::AppContext,
    error::{ApiError, ApiResult},
    store::{teams::TeamWithRole, TeamInvite, TeamMember, TeamRole},
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/teams",
            get(list_teams).post(create_team).fallback(method_not_allowed),
        )
        .route(
            "/teams/:id/members",
            get(list_members).fallback(method_not_allowed),
        )
        .route(
            "/teams/:id/invites",
            get(list_invites).post(create_invite).fallback(method_not_allowed),
        )
        .route(
            "/invites/accept",
            post(accept_invite).fallback(method_not_allowed),
        )
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTeamRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTeamResponse {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateInviteRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptInviteRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteResponse {
    pub team_id: String,
    pub joined: bool,
}

/// GET /api/teams
async fn list_teams(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<TeamWithRole>>> {
    let teams = ctx
        .teams
        .list_for_user(&user.sub)
        .await
        .map_err(ApiError::read("could not list teams"))?;
    Ok(Json(teams))
}

/// POST /api/teams
async fn create_team(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    StrictJson(req): StrictJson<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<CreateTeamResponse>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::MissingName);
    }

    let now = Utc::now();
    let user = ctx.gate.require_user(&headers, now).await?;

    let id = Uuid::new_v4().to_string();
    let team = ctx
        .teams
        .create_team(&id, name, &user.sub, now)
        .await
        .map_err(ApiError::insert("could not create team"))?;

    info!("User {} created team {}", user.sub, team.id);
    Ok((
        StatusCode::CREATED,
        Json(CreateTeamResponse {
            id: team.id,
            name: team.name,
        }),
    ))
}

/// GET /api/teams/:id/members
async fn list_members(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Path(team_id): Path<String>,
) -> ApiResult<Json<Vec<TeamMember>>> {
    require_role(&ctx, &team_id, &user.sub, None).await?;

    let members = ctx
        .teams
        .list_members(&team_id)
        .await
        .map_err(ApiError::read("could not list team members"))?;
    Ok(Json(members))
}

/// GET /api/teams/:id/invites
async fn list_invites(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Path(team_id): Path<String>,
) -> ApiResult<Json<Vec<TeamInvite>>> {
    require_role(&ctx, &team_id, &user.sub, Some(TeamRole::Owner)).await?;

    let invites = ctx
        .teams
        .list_pending_invites(&team_id, Utc::now())
        .await
        .map_err(ApiError::read("could not list invites"))?;
    Ok(Json(invites))
}

/// POST /api/teams/:id/invites
async fn create_invite(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
    headers: HeaderMap,
    StrictJson(req): StrictJson<CreateInviteRequest>,
) -> ApiResult<(StatusCode, Json<CreateInviteResponse>)> {
    let now = Utc::now();
    let user = ctx.gate.require_user(&headers, now).await?;
    require_role(&ctx, &team_id, &user.sub, Some(TeamRole::Owner)).await?;

    let ttl = Duration::from_std(ctx.config.invites.ttl).unwrap_or_else(|_| Duration::days(7));
    let token = Uuid::new_v4().to_string();
    let invite = ctx
        .teams
        .create_invite(&token, &team_id, req.email.trim(), &user.sub, now, now + ttl)
        .await
        .map_err(ApiError::insert("could not create invite"))?;

    Ok((
        StatusCode::CREATED,
        Json(CreateInviteResponse {
            token: invite.token,
            expires_at: invite.expires_at,
        }),
    ))
}

/// POST /api/invites/accept
async fn accept_invite(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    StrictJson(req): StrictJson<AcceptInviteRequest>,
) -> ApiResult<Json<AcceptInviteResponse>> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(ApiError::MissingToken);
    }

    let now = Utc::now();
    let user = ctx.gate.require_user(&headers, now).await?;

    let team_id = ctx
        .teams
        .accept_invite(token, &user.sub, now)
        .await
        .map_err(ApiError::update("could not accept invite"))?;

    info!("User {} joined team {}", user.sub, team_id);
    Ok(Json(AcceptInviteResponse {
        team_id,
        joined: true,
    }))
}

/// Require membership, optionally with a specific role
async fn require_role(
    ctx: &AppContext,
    team_id: &str,
    sub: &str,
    required: Option<TeamRole>,
) -> ApiResult<()> {
    let role = ctx
        .teams
        .member_role(team_id, sub)
        .await
        .map_err(ApiError::read("could not read team membership"))?;

    match (role, required) {
        (None, _) => Err(ApiError::Forbidden("not a team member")),
        (Some(role), Some(required)) if role != required => {
            Err(ApiError::Forbidden("only team owners can do this"))
        }
        _ => Ok(()),
    }
}
