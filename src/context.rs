/// Application context shared by every request handler
use crate::{
    auth::{AuthStrategy, AuthorizationGate, HttpKeySource, OidcVerifier, SharedSecret},
    config::ServerConfig,
    db::{self, DatabaseOptions},
    error::{ServerError, ServerResult},
    store::{SessionStore, ShareStore, TeamStore, UserStore},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

/// Main application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub sessions: SessionStore,
    pub shares: ShareStore,
    pub teams: TeamStore,
    pub users: UserStore,
    pub gate: AuthorizationGate,
}

impl AppContext {
    /// Open the database and pick the auth strategy
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        info!("Opening database at {}", config.storage.db_path.display());
        let db = db::create_pool(
            &config.storage.db_path,
            DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await?;
        db::run_migrations(&db).await?;

        let strategy = match &config.auth.oidc {
            Some(oidc) => {
                info!("OIDC mode, issuer {}", oidc.issuer_url);
                let source = HttpKeySource::discover(&oidc.issuer_url, oidc.http_timeout)
                    .await
                    .map_err(|e| ServerError::Oidc(e.to_string()))?;
                AuthStrategy::Oidc(Arc::new(OidcVerifier::new(oidc, Arc::new(source)).await))
            }
            None => {
                info!("Legacy shared-secret mode");
                if config.auth.password == "ChangeMe123!" {
                    warn!("EDS_SHARE_PASSWORD is the default value, set a real secret");
                }
                AuthStrategy::SharedSecret(SharedSecret::new(config.auth.password.clone()))
            }
        };

        Ok(Self::with_strategy(config, db, strategy))
    }

    /// Wire stores and the gate around an existing pool
    pub fn with_strategy(config: ServerConfig, db: SqlitePool, strategy: AuthStrategy) -> Self {
        let sessions = SessionStore::new(db.clone());
        let shares = ShareStore::new(db.clone());
        let teams = TeamStore::new(db.clone());
        let users = UserStore::new(db.clone());

        let gate = AuthorizationGate::new(
            strategy,
            sessions.clone(),
            shares.clone(),
            teams.clone(),
            users.clone(),
            config.auth.admin_subs.clone(),
            config.session.cookie_name.clone(),
            config.session.ttl,
        );

        Self {
            config: Arc::new(config),
            db,
            sessions,
            shares,
            teams,
            users,
            gate,
        }
    }
}
