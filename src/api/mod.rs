/// API routes and handlers, mounted under `/api`
pub mod admin;
pub mod extract;
pub mod health;
pub mod me;
pub mod shares;
pub mod teams;
pub mod versions;

use crate::{context::AppContext, error::ApiError};
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(shares::routes())
        .merge(versions::routes())
        .merge(teams::routes())
        .merge(me::routes())
        .merge(admin::routes())
}

/// Known path, unsupported method
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Unknown path
pub async fn not_found() -> ApiError {
    ApiError::NotFound("not found")
}
