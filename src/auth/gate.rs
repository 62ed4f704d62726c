/// Per-request authorization decisions
use super::{extract_bearer_token, generate_token, session_token, Identity, OidcVerifier, SharedSecret};
use crate::{
    error::{ApiError, ApiResult},
    store::{Share, SessionStore, ShareStore, StoreError, TeamStore, UserStore},
};
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// How callers prove who they are, fixed at startup
pub enum AuthStrategy {
    /// Shared secret plus share-bound session cookies
    SharedSecret(SharedSecret),
    /// Bearer tokens from an OIDC provider
    Oidc(Arc<OidcVerifier>),
}

/// What the caller wants to do with a share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareAccess {
    Read,
    Write,
    Delete,
    /// Listing, reading and restoring versions
    History,
}

/// Session minted for a legacy-mode caller
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a successful share authorization
#[derive(Debug)]
pub struct Grant {
    pub share: Share,
    /// Empty in legacy mode
    pub actor_sub: String,
    pub issued: Option<IssuedSession>,
}

#[derive(Clone)]
pub struct AuthorizationGate {
    strategy: Arc<AuthStrategy>,
    sessions: SessionStore,
    shares: ShareStore,
    teams: TeamStore,
    users: UserStore,
    admin_subs: Arc<Vec<String>>,
    cookie_name: String,
    session_ttl: Duration,
}

impl AuthorizationGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy: AuthStrategy,
        sessions: SessionStore,
        shares: ShareStore,
        teams: TeamStore,
        users: UserStore,
        admin_subs: Vec<String>,
        cookie_name: String,
        session_ttl: std::time::Duration,
    ) -> Self {
        Self {
            strategy: Arc::new(strategy),
            sessions,
            shares,
            teams,
            users,
            admin_subs: Arc::new(admin_subs),
            cookie_name,
            session_ttl: Duration::from_std(session_ttl).unwrap_or_else(|_| Duration::days(7)),
        }
    }

    pub fn oidc_enabled(&self) -> bool {
        matches!(*self.strategy, AuthStrategy::Oidc(_))
    }

    /// Verify the bearer token and record the login.
    ///
    /// Missing or bad tokens are always `unauthorized`. The user upsert and
    /// bootstrap-admin grant are best-effort.
    pub async fn require_user(&self, headers: &HeaderMap, now: DateTime<Utc>) -> ApiResult<Identity> {
        let AuthStrategy::Oidc(verifier) = &*self.strategy else {
            return Err(ApiError::OidcNotEnabled);
        };

        let token = extract_bearer_token(headers).ok_or(ApiError::Unauthorized)?;
        let identity = verifier.verify(&token).await.map_err(|e| {
            debug!("Bearer token rejected: {}", e);
            ApiError::Unauthorized
        })?;

        // best-effort bookkeeping
        if let Err(e) = self
            .users
            .upsert_login(&identity.sub, &identity.email, &identity.name, now)
            .await
        {
            warn!("Could not record login for {}: {}", identity.sub, e);
        }
        if self.admin_subs.iter().any(|s| s == &identity.sub) {
            if let Err(e) = self.users.set_admin(&identity.sub, true, now).await {
                warn!("Could not grant bootstrap admin to {}: {}", identity.sub, e);
            }
        }

        Ok(identity)
    }

    /// Authenticated user whose admin flag is set right now
    pub async fn require_admin(&self, headers: &HeaderMap, now: DateTime<Utc>) -> ApiResult<Identity> {
        let identity = self.require_user(headers, now).await?;
        let is_admin = self
            .users
            .is_admin(&identity.sub)
            .await
            .map_err(ApiError::read("could not read user"))?;
        if !is_admin {
            return Err(ApiError::Forbidden("admin required"));
        }
        Ok(identity)
    }

    /// Authorize share creation; returns the owner subject to record.
    pub async fn authorize_create(
        &self,
        headers: &HeaderMap,
        password: &str,
        team_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ApiResult<String> {
        self.cleanup_sessions(now).await;

        match &*self.strategy {
            AuthStrategy::Oidc(_) => {
                let identity = self.require_user(headers, now).await?;
                if let Some(team_id) = team_id {
                    let role = self
                        .teams
                        .member_role(team_id, &identity.sub)
                        .await
                        .map_err(ApiError::read("could not read team membership"))?;
                    if role.is_none() {
                        return Err(ApiError::Forbidden("not a team member"));
                    }
                }
                Ok(identity.sub)
            }
            AuthStrategy::SharedSecret(secret) => {
                self.legacy_authenticate(secret, headers, password, None, now)
                    .await?;
                if let Some(team_id) = team_id {
                    self.teams
                        .get_team(team_id)
                        .await
                        .map_err(ApiError::read("could not read team"))?;
                }
                Ok(String::new())
            }
        }
    }

    /// Authorize an operation on an existing share.
    ///
    /// The share is loaded first so an unknown id is `not_found` in every
    /// mode. With OIDC the caller must own the share or belong to its team;
    /// deletion needs strict ownership. Without OIDC reads are public,
    /// writes need a session bound to this share or the shared secret, and
    /// history needs a bound session.
    pub async fn authorize_share(
        &self,
        headers: &HeaderMap,
        share_id: &str,
        access: ShareAccess,
        password: Option<&str>,
        now: DateTime<Utc>,
    ) -> ApiResult<Grant> {
        self.cleanup_sessions(now).await;

        let share = self
            .shares
            .get_share(share_id)
            .await
            .map_err(ApiError::read("could not read share"))?;

        match &*self.strategy {
            AuthStrategy::Oidc(_) => {
                let identity = self.require_user(headers, now).await?;
                let is_owner = !share.owner_sub.is_empty() && share.owner_sub == identity.sub;

                let allowed = if is_owner {
                    true
                } else if access == ShareAccess::Delete {
                    false
                } else if let Some(team_id) = &share.team_id {
                    self.teams
                        .member_role(team_id, &identity.sub)
                        .await
                        .map_err(ApiError::read("could not read team membership"))?
                        .is_some()
                } else {
                    false
                };

                if !allowed {
                    return Err(ApiError::Forbidden("not allowed"));
                }
                Ok(Grant {
                    share,
                    actor_sub: identity.sub,
                    issued: None,
                })
            }
            AuthStrategy::SharedSecret(secret) => {
                let issued = match access {
                    ShareAccess::Read => None,
                    ShareAccess::Delete => return Err(ApiError::Unauthorized),
                    ShareAccess::History => {
                        if !self.has_session_for(headers, Some(share_id), now).await {
                            return Err(ApiError::Unauthorized);
                        }
                        None
                    }
                    ShareAccess::Write => {
                        self.legacy_authenticate(
                            secret,
                            headers,
                            password.unwrap_or_default(),
                            Some(share_id),
                            now,
                        )
                        .await?
                    }
                };
                Ok(Grant {
                    share,
                    actor_sub: String::new(),
                    issued,
                })
            }
        }
    }

    /// Session first, then password. A password success bound to a share
    /// issues a fresh session for it.
    async fn legacy_authenticate(
        &self,
        secret: &SharedSecret,
        headers: &HeaderMap,
        password: &str,
        share_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ApiResult<Option<IssuedSession>> {
        if self.has_session_for(headers, share_id, now).await {
            return Ok(None);
        }
        if password.trim().is_empty() {
            return Err(ApiError::PasswordRequired);
        }
        if !secret.verify(password) {
            return Err(ApiError::InvalidPassword);
        }

        Ok(match share_id {
            Some(share_id) => self.issue_session(share_id, now).await,
            None => None,
        })
    }

    /// Whether the request carries a live session; with `share_id` the
    /// session must be bound to exactly that share.
    async fn has_session_for(&self, headers: &HeaderMap, share_id: Option<&str>, now: DateTime<Utc>) -> bool {
        let Some(token) = session_token(headers, &self.cookie_name) else {
            return false;
        };
        match self.sessions.lookup(&token, now).await {
            Ok(bound) => share_id.map_or(true, |id| bound == id),
            Err(StoreError::NotFound(_)) => false,
            Err(e) => {
                warn!("Session lookup failed: {}", e);
                false
            }
        }
    }

    /// Mint a session bound to `share_id`. Best-effort: a storage failure
    /// yields no cookie rather than failing the request.
    pub async fn issue_session(&self, share_id: &str, now: DateTime<Utc>) -> Option<IssuedSession> {
        let issued = IssuedSession {
            token: generate_token(),
            expires_at: now + self.session_ttl,
        };
        match self
            .sessions
            .create_session(&issued.token, share_id, issued.expires_at, now)
            .await
        {
            Ok(()) => Some(issued),
            Err(e) => {
                warn!("Could not issue session for share {}: {}", share_id, e);
                None
            }
        }
    }

    /// Drop expired sessions; runs ahead of every authorization check and
    /// never fails it.
    async fn cleanup_sessions(&self, now: DateTime<Utc>) {
        if let Err(e) = self.sessions.cleanup_expired(now).await {
            debug!("Expired session cleanup failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oidc::testing;
    use crate::db::memory_pool;
    use axum::http::{header, HeaderValue};
    use sqlx::SqlitePool;

    struct Fixture {
        gate: AuthorizationGate,
        sessions: SessionStore,
        shares: ShareStore,
        teams: TeamStore,
        users: UserStore,
    }

    async fn fixture(strategy: AuthStrategy, admin_subs: Vec<String>) -> Fixture {
        let db: SqlitePool = memory_pool().await;
        let shares = ShareStore::new(db.clone());
        let teams = TeamStore::new(db.clone());
        let users = UserStore::new(db.clone());
        let sessions = SessionStore::new(db.clone());
        let gate = AuthorizationGate::new(
            strategy,
            sessions.clone(),
            shares.clone(),
            teams.clone(),
            users.clone(),
            admin_subs,
            "eds_session".to_string(),
            std::time::Duration::from_secs(3600),
        );
        Fixture {
            gate,
            sessions,
            shares,
            teams,
            users,
        }
    }

    async fn legacy() -> Fixture {
        fixture(AuthStrategy::SharedSecret(SharedSecret::new("ChangeMe123!")), vec![]).await
    }

    async fn oidc(admin_subs: Vec<String>) -> Fixture {
        fixture(AuthStrategy::Oidc(Arc::new(testing::verifier().await)), admin_subs).await
    }

    fn bearer(sub: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", testing::token_for(sub));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    fn cookie(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("eds_session={token}");
        headers.insert(header::COOKIE, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_legacy_write_session_then_password() {
        let f = legacy().await;
        let now = Utc::now();
        f.shares.create_share("s1", "", "EDS", "", None, now).await.unwrap();
        f.shares.create_share("s2", "", "EDS", "", None, now).await.unwrap();
        let none = HeaderMap::new();

        let err = f
            .gate
            .authorize_share(&none, "s1", ShareAccess::Write, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "password_required");

        let err = f
            .gate
            .authorize_share(&none, "s1", ShareAccess::Write, Some("wrong"), now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_password");

        let grant = f
            .gate
            .authorize_share(&none, "s1", ShareAccess::Write, Some("ChangeMe123!"), now)
            .await
            .unwrap();
        let issued = grant.issued.unwrap();

        // The issued session works for s1 without a password
        let grant = f
            .gate
            .authorize_share(&cookie(&issued.token), "s1", ShareAccess::Write, None, now)
            .await
            .unwrap();
        assert!(grant.issued.is_none());

        // but is bound to s1 only
        let err = f
            .gate
            .authorize_share(&cookie(&issued.token), "s2", ShareAccess::Write, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "password_required");

        // and lapses at expiry, falling through to the password check
        let later = issued.expires_at;
        let err = f
            .gate
            .authorize_share(&cookie(&issued.token), "s1", ShareAccess::Write, None, later)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "password_required");
    }

    #[tokio::test]
    async fn test_legacy_read_is_public_and_delete_refused() {
        let f = legacy().await;
        let now = Utc::now();
        f.shares.create_share("s1", "", "EDS", "", None, now).await.unwrap();
        let none = HeaderMap::new();

        let grant = f
            .gate
            .authorize_share(&none, "s1", ShareAccess::Read, None, now)
            .await
            .unwrap();
        assert_eq!(grant.share.id, "s1");

        let err = f
            .gate
            .authorize_share(&none, "s1", ShareAccess::Delete, Some("ChangeMe123!"), now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");

        let err = f
            .gate
            .authorize_share(&none, "s1", ShareAccess::History, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");

        let err = f
            .gate
            .authorize_share(&none, "missing", ShareAccess::Read, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_legacy_create() {
        let f = legacy().await;
        let now = Utc::now();
        let none = HeaderMap::new();

        assert_eq!(
            f.gate.authorize_create(&none, "", None, now).await.unwrap_err().code(),
            "password_required"
        );
        assert_eq!(
            f.gate
                .authorize_create(&none, "ChangeMe123!", None, now)
                .await
                .unwrap(),
            ""
        );
        assert_eq!(
            f.gate
                .authorize_create(&none, "ChangeMe123!", Some("no-team"), now)
                .await
                .unwrap_err()
                .code(),
            "not_found"
        );

        // Any live session is enough to create
        let issued = f.gate.issue_session("other", now).await.unwrap();
        assert!(f
            .gate
            .authorize_create(&cookie(&issued.token), "", None, now)
            .await
            .is_ok());

        assert_eq!(
            f.gate.require_user(&none, now).await.unwrap_err().code(),
            "oidc_not_enabled"
        );
    }

    #[tokio::test]
    async fn test_oidc_team_access() {
        let f = oidc(vec![]).await;
        let now = Utc::now();
        f.teams.create_team("t1", "Crew", "alice", now).await.unwrap();
        f.teams
            .create_invite("inv", "t1", "", "alice", now, now + Duration::days(7))
            .await
            .unwrap();
        f.teams.accept_invite("inv", "bob", now).await.unwrap();
        f.shares
            .create_share("s1", "", "EDS", "alice", Some("t1"), now)
            .await
            .unwrap();

        for access in [ShareAccess::Read, ShareAccess::Write, ShareAccess::History] {
            let grant = f
                .gate
                .authorize_share(&bearer("bob"), "s1", access, None, now)
                .await
                .unwrap();
            assert_eq!(grant.actor_sub, "bob");
        }

        let err = f
            .gate
            .authorize_share(&bearer("bob"), "s1", ShareAccess::Delete, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        assert!(f
            .gate
            .authorize_share(&bearer("alice"), "s1", ShareAccess::Delete, None, now)
            .await
            .is_ok());

        let err = f
            .gate
            .authorize_share(&bearer("mallory"), "s1", ShareAccess::Read, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let err = f
            .gate
            .authorize_share(&HeaderMap::new(), "s1", ShareAccess::Read, None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[tokio::test]
    async fn test_oidc_create_requires_team_membership() {
        let f = oidc(vec![]).await;
        let now = Utc::now();
        f.teams.create_team("t1", "Crew", "alice", now).await.unwrap();

        assert_eq!(
            f.gate
                .authorize_create(&bearer("alice"), "", Some("t1"), now)
                .await
                .unwrap(),
            "alice"
        );
        assert_eq!(
            f.gate
                .authorize_create(&bearer("bob"), "", Some("t1"), now)
                .await
                .unwrap_err()
                .code(),
            "forbidden"
        );
        assert_eq!(
            f.gate
                .authorize_create(&HeaderMap::new(), "ChangeMe123!", None, now)
                .await
                .unwrap_err()
                .code(),
            "unauthorized"
        );
    }

    #[tokio::test]
    async fn test_admin_checked_fresh_and_bootstrapped() {
        let f = oidc(vec!["root".to_string()]).await;
        let now = Utc::now();

        // Bootstrap subject becomes admin on first request
        assert!(f.gate.require_admin(&bearer("root"), now).await.is_ok());

        // Login records the user but never grants admin
        let err = f.gate.require_admin(&bearer("alice"), now).await.unwrap_err();
        assert_eq!(err.code(), "forbidden");
        assert_eq!(f.users.get_user("alice").await.unwrap().email, "alice@example.com");

        f.users.set_admin("alice", true, now).await.unwrap();
        assert!(f.gate.require_admin(&bearer("alice"), now).await.is_ok());

        // Demotion applies to the very next call
        f.users.set_admin("alice", false, now).await.unwrap();
        assert_eq!(
            f.gate.require_admin(&bearer("alice"), now).await.unwrap_err().code(),
            "forbidden"
        );
    }

    #[tokio::test]
    async fn test_every_check_sweeps_expired_sessions() {
        let now = Utc::now();
        let stale = now - Duration::minutes(5);

        // OIDC read, a path that never consults sessions itself
        let f = oidc(vec![]).await;
        f.shares.create_share("s1", "", "EDS", "alice", None, now).await.unwrap();
        f.sessions.create_session("old", "s1", stale, stale - Duration::hours(1)).await.unwrap();
        f.gate
            .authorize_share(&bearer("alice"), "s1", ShareAccess::Read, None, now)
            .await
            .unwrap();
        assert_eq!(f.sessions.cleanup_expired(now).await.unwrap(), 0);

        // Even a rejected check sweeps first
        let f = legacy().await;
        f.sessions.create_session("old", "", stale, stale - Duration::hours(1)).await.unwrap();
        let err = f
            .gate
            .authorize_create(&HeaderMap::new(), "", None, now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "password_required");
        assert_eq!(f.sessions.cleanup_expired(now).await.unwrap(), 0);

        let f = legacy().await;
        f.shares.create_share("s1", "", "EDS", "", None, now).await.unwrap();
        f.sessions.create_session("old", "s1", stale, stale - Duration::hours(1)).await.unwrap();
        f.gate
            .authorize_share(&HeaderMap::new(), "s1", ShareAccess::Read, None, now)
            .await
            .unwrap();
        assert_eq!(f.sessions.cleanup_expired(now).await.unwrap(), 0);
    }
}
