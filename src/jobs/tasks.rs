/// Background task implementations
use crate::{context::AppContext, store::StoreResult};
use chrono::Utc;

/// Delete every session whose expiry has passed
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> StoreResult<u64> {
    ctx.sessions.cleanup_expired(Utc::now()).await
}
