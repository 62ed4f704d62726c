/// OIDC user records
use super::{StoreError, StoreResult};
use crate::db::{from_millis, to_millis};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// User manager
#[derive(Clone)]
pub struct UserStore {
    db: SqlitePool,
}

impl UserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record a login.
    ///
    /// Creates the user on first sight; afterwards refreshes email and name
    /// when the token carries them and advances `last_seen_at`. Never
    /// touches `is_admin`.
    pub async fn upsert_login(
        &self,
        sub: &str,
        email: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let ts = to_millis(now);

        sqlx::query(
            r#"
            INSERT INTO users (sub, email, name, is_admin, created_at, updated_at, last_seen_at)
            VALUES (?, ?, ?, 0, ?, ?, ?)
            ON CONFLICT (sub) DO UPDATE SET
                email = CASE WHEN excluded.email <> '' THEN excluded.email ELSE users.email END,
                name = CASE WHEN excluded.name <> '' THEN excluded.name ELSE users.name END,
                updated_at = MAX(users.updated_at, excluded.updated_at),
                last_seen_at = MAX(users.last_seen_at, excluded.last_seen_at)
            "#,
        )
        .bind(sub)
        .bind(email)
        .bind(name)
        .bind(ts)
        .bind(ts)
        .bind(ts)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Admin flag, read fresh. Unknown users are not admins.
    pub async fn is_admin(&self, sub: &str) -> StoreResult<bool> {
        let flag: Option<bool> = sqlx::query_scalar("SELECT is_admin FROM users WHERE sub = ?")
            .bind(sub)
            .fetch_optional(&self.db)
            .await?;

        Ok(flag.unwrap_or(false))
    }

    pub async fn set_admin(&self, sub: &str, is_admin: bool, now: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET is_admin = ?, updated_at = MAX(updated_at, ?) WHERE sub = ?",
        )
        .bind(is_admin)
        .bind(to_millis(now))
        .bind(sub)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user not found"));
        }

        Ok(())
    }

    pub async fn get_user(&self, sub: &str) -> StoreResult<User> {
        let row = sqlx::query(
            r#"
            SELECT sub, email, name, is_admin, created_at, updated_at, last_seen_at
            FROM users WHERE sub = ?
            "#,
        )
        .bind(sub)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound("user not found"))?;

        Ok(user_from_row(&row))
    }

    /// Case-insensitive substring search over sub, email and name,
    /// most recently seen first
    pub async fn list_users(&self, query: &str, limit: i64) -> StoreResult<Vec<User>> {
        let limit = match limit {
            l if l <= 0 => 200,
            l if l > 500 => 500,
            l => l,
        };
        let q = query.trim().to_lowercase();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT sub, email, name, is_admin, created_at, updated_at, last_seen_at FROM users",
        );
        if !q.is_empty() {
            let like = format!("%{q}%");
            qb.push(" WHERE lower(sub) LIKE ")
                .push_bind(like.clone())
                .push(" OR lower(email) LIKE ")
                .push_bind(like.clone())
                .push(" OR lower(name) LIKE ")
                .push_bind(like);
        }
        qb.push(" ORDER BY last_seen_at DESC LIMIT ").push_bind(limit);

        let rows = qb.build().fetch_all(&self.db).await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Bulk lookup for enriching listings; unknown subs are skipped
    pub async fn get_users_by_subs(&self, subs: &[String]) -> StoreResult<Vec<User>> {
        if subs.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT sub, email, name, is_admin, created_at, updated_at, last_seen_at FROM users WHERE sub IN (",
        );
        let mut list = qb.separated(", ");
        for sub in subs {
            list.push_bind(sub);
        }
        list.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.db).await?;
        Ok(rows.iter().map(user_from_row).collect())
    }
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        sub: row.get("sub"),
        email: row.get("email"),
        name: row.get("name"),
        is_admin: row.get("is_admin"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
        last_seen_at: from_millis(row.get("last_seen_at")),
    }
}
