/// Legacy-mode session tokens with explicit expiry
use super::{StoreError, StoreResult};
use crate::db::to_millis;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Session store
#[derive(Clone)]
pub struct SessionStore {
    db: SqlitePool,
}

impl SessionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a session. `share_id` may be empty for a login not bound to a share.
    pub async fn create_session(
        &self,
        token: &str,
        share_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, share_id, expires_at, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(token)
        .bind(share_id)
        .bind(to_millis(expires_at))
        .bind(to_millis(now))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Resolve a token to the share it is bound to.
    ///
    /// Fails with `NotFound` when the token is unknown or `now >= expires_at`;
    /// an expired row is deleted on the way out.
    pub async fn lookup(&self, token: &str, now: DateTime<Utc>) -> StoreResult<String> {
        let row = sqlx::query("SELECT share_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound("session not found"))?;

        let share_id: String = row.get("share_id");
        let expires_at: i64 = row.get("expires_at");

        if to_millis(now) >= expires_at {
            if let Err(e) = sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.db)
                .await
            {
                debug!("Could not delete expired session: {}", e);
            }
            return Err(StoreError::NotFound("session expired"));
        }

        Ok(share_id)
    }

    /// Delete every session with `expires_at <= now`
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(to_millis(now))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use chrono::Duration;

    async fn count(db: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_before_and_after_expiry() {
        let db = memory_pool().await;
        let store = SessionStore::new(db.clone());
        let now = Utc::now();
        let expires = now + Duration::hours(1);

        store.create_session("tok", "share-1", expires, now).await.unwrap();

        for offset in [0, 1, 30 * 60 * 1000, 60 * 60 * 1000 - 1] {
            let at = now + Duration::milliseconds(offset);
            assert_eq!(store.lookup("tok", at).await.unwrap(), "share-1");
        }

        // Exactly at expiry the session is gone, and the row is removed
        let err = store.lookup("tok", expires).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(count(&db).await, 0);

        let err = store.lookup("tok", now).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_lookup_unknown_token() {
        let store = SessionStore::new(memory_pool().await);
        let err = store.lookup("missing", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let db = memory_pool().await;
        let store = SessionStore::new(db.clone());
        let now = Utc::now();

        store
            .create_session("old", "a", now - Duration::minutes(1), now - Duration::hours(2))
            .await
            .unwrap();
        store.create_session("edge", "b", now, now - Duration::hours(1)).await.unwrap();
        store
            .create_session("fresh", "", now + Duration::hours(1), now)
            .await
            .unwrap();

        assert_eq!(store.cleanup_expired(now).await.unwrap(), 2);
        assert_eq!(count(&db).await, 1);
        assert_eq!(store.lookup("fresh", now).await.unwrap(), "");
    }
}
