/// Shares, their version history and retention pruning
use super::{StoreError, StoreResult};
use crate::db::{from_millis, to_millis};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};

/// Rows deleted per statement when pruning old versions
const PRUNE_BATCH: i64 = 500;

/// A stored diagram
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub id: String,
    pub name: String,
    pub schema: String,
    pub owner_sub: String,
    pub team_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Share without its schema blob, for listings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareSummary {
    pub id: String,
    pub name: String,
    pub owner_sub: String,
    pub team_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Version metadata; the schema is fetched separately
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareVersion {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub created_by_sub: String,
}

/// Share manager
#[derive(Clone)]
pub struct ShareStore {
    db: SqlitePool,
}

impl ShareStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a share. The schema must already have passed the tag check.
    pub async fn create_share(
        &self,
        id: &str,
        name: &str,
        schema: &str,
        owner_sub: &str,
        team_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO shares (id, name, schema_data, owner_sub, team_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(schema)
        .bind(owner_sub)
        .bind(team_id)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn get_share(&self, id: &str) -> StoreResult<Share> {
        let row = sqlx::query(
            r#"
            SELECT id, name, schema_data, owner_sub, team_id, created_at, updated_at
            FROM shares
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound("share not found"))?;

        Ok(Share {
            id: row.get("id"),
            name: row.get("name"),
            schema: row.get("schema_data"),
            owner_sub: row.get("owner_sub"),
            team_id: row.get("team_id"),
            created_at: from_millis(row.get("created_at")),
            updated_at: from_millis(row.get("updated_at")),
        })
    }

    /// Update schema and/or name and bump `updated_at`.
    ///
    /// At least one of the two must be given. `updated_at` never moves
    /// backwards even if `now` does.
    pub async fn update_share(
        &self,
        id: &str,
        schema: Option<&str>,
        name: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        if schema.is_none() && name.is_none() {
            return Err(StoreError::Invalid("schema or name is required"));
        }

        let result = sqlx::query(
            r#"
            UPDATE shares
            SET schema_data = COALESCE(?, schema_data),
                name = COALESCE(?, name),
                updated_at = MAX(updated_at, ?)
            WHERE id = ?
            "#,
        )
        .bind(schema)
        .bind(name)
        .bind(to_millis(now))
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("share not found"));
        }

        Ok(())
    }

    /// Delete a share together with its versions and bound sessions
    pub async fn delete_share(&self, id: &str) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM share_versions WHERE share_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE share_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM shares WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("share not found"));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Shares owned by `owner_sub`, most recently updated first
    pub async fn list_by_owner(&self, owner_sub: &str, limit: i64) -> StoreResult<Vec<ShareSummary>> {
        let limit = if limit <= 0 || limit > 200 { 200 } else { limit };

        let rows = sqlx::query(
            r#"
            SELECT id, name, owner_sub, team_id, created_at, updated_at
            FROM shares
            WHERE owner_sub = ?
            ORDER BY updated_at DESC
            LIMIT ?
            "#,
        )
        .bind(owner_sub)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    /// Every share, most recently updated first
    pub async fn list_all(&self, limit: i64) -> StoreResult<Vec<ShareSummary>> {
        let limit = if limit <= 0 || limit > 1000 { 1000 } else { limit };

        let rows = sqlx::query(
            r#"
            SELECT id, name, owner_sub, team_id, created_at, updated_at
            FROM shares
            ORDER BY updated_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    pub async fn add_version(
        &self,
        version_id: &str,
        share_id: &str,
        schema: &str,
        created_by_sub: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO share_versions (id, share_id, schema_data, created_at, created_by_sub)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(version_id)
        .bind(share_id)
        .bind(schema)
        .bind(to_millis(now))
        .bind(created_by_sub)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Newest versions first; equal timestamps fall back to insertion order
    pub async fn list_versions(&self, share_id: &str, limit: i64) -> StoreResult<Vec<ShareVersion>> {
        let limit = if limit <= 0 || limit > 200 { 200 } else { limit };

        let rows = sqlx::query(
            r#"
            SELECT id, created_at, created_by_sub
            FROM share_versions
            WHERE share_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(share_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ShareVersion {
                id: row.get("id"),
                created_at: from_millis(row.get("created_at")),
                created_by_sub: row.get("created_by_sub"),
            })
            .collect())
    }

    /// Schema snapshot of one version of one share
    pub async fn get_version(&self, share_id: &str, version_id: &str) -> StoreResult<String> {
        let schema: Option<String> = sqlx::query_scalar(
            "SELECT schema_data FROM share_versions WHERE share_id = ? AND id = ?",
        )
        .bind(share_id)
        .bind(version_id)
        .fetch_optional(&self.db)
        .await?;

        schema.ok_or(StoreError::NotFound("version not found"))
    }

    /// Keep only the newest `keep` versions of a share.
    ///
    /// Deletes in batches so no single statement runs long. `keep <= 0`
    /// disables pruning. Returns the number of rows removed.
    pub async fn prune_versions(&self, share_id: &str, keep: i64) -> StoreResult<u64> {
        if keep <= 0 {
            return Ok(0);
        }

        let mut removed = 0;
        loop {
            let stale: Vec<String> = sqlx::query_scalar(
                r#"
                SELECT id FROM share_versions
                WHERE share_id = ?
                ORDER BY created_at DESC, rowid DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(share_id)
            .bind(PRUNE_BATCH)
            .bind(keep)
            .fetch_all(&self.db)
            .await?;

            if stale.is_empty() {
                break;
            }

            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM share_versions WHERE id IN (");
            let mut ids = qb.separated(", ");
            for id in &stale {
                ids.push_bind(id);
            }
            ids.push_unseparated(")");

            let result = qb.build().execute(&self.db).await?;
            removed += result.rows_affected();

            if (stale.len() as i64) < PRUNE_BATCH {
                break;
            }
        }

        Ok(removed)
    }
}

fn summary_from_row(row: &SqliteRow) -> ShareSummary {
    ShareSummary {
        id: row.get("id"),
        name: row.get("name"),
        owner_sub: row.get("owner_sub"),
        team_id: row.get("team_id"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    }
}
