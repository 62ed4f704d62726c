/// Teams, memberships and invites
use super::{StoreError, StoreResult};
use crate::db::{from_millis, to_millis};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// Team member role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Owner,
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::Member => "member",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(TeamRole::Owner),
            "member" => Some(TeamRole::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    pub owner_sub: String,
    pub created_at: DateTime<Utc>,
}

/// A team as seen by one of its members
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamWithRole {
    pub id: String,
    pub name: String,
    pub role: TeamRole,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub user_sub: String,
    pub role: TeamRole,
    pub email: String,
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamInvite {
    pub token: String,
    pub team_id: String,
    pub email: String,
    pub created_by_sub: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Team manager
#[derive(Clone)]
pub struct TeamStore {
    db: SqlitePool,
}

impl TeamStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a team and its owner membership in one transaction
    pub async fn create_team(
        &self,
        id: &str,
        name: &str,
        owner_sub: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Team> {
        let mut tx = self.db.begin().await?;

        sqlx::query("INSERT INTO teams (id, name, owner_sub, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(owner_sub)
            .bind(to_millis(now))
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO team_members (team_id, user_sub, role, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(owner_sub)
        .bind(TeamRole::Owner.as_str())
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Team {
            id: id.to_string(),
            name: name.to_string(),
            owner_sub: owner_sub.to_string(),
            created_at: now,
        })
    }

    pub async fn get_team(&self, id: &str) -> StoreResult<Team> {
        let row = sqlx::query("SELECT id, name, owner_sub, created_at FROM teams WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound("team not found"))?;

        Ok(Team {
            id: row.get("id"),
            name: row.get("name"),
            owner_sub: row.get("owner_sub"),
            created_at: from_millis(row.get("created_at")),
        })
    }

    /// Teams the user belongs to, newest first
    pub async fn list_for_user(&self, user_sub: &str) -> StoreResult<Vec<TeamWithRole>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, m.role
            FROM team_members m
            JOIN teams t ON t.id = m.team_id
            WHERE m.user_sub = ?
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(user_sub)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TeamWithRole {
                id: row.get("id"),
                name: row.get("name"),
                role: TeamRole::from_str(row.get("role")).unwrap_or(TeamRole::Member),
            })
            .collect())
    }

    /// Role of `user_sub` in the team, `None` when not a member
    pub async fn member_role(&self, team_id: &str, user_sub: &str) -> StoreResult<Option<TeamRole>> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM team_members WHERE team_id = ? AND user_sub = ?",
        )
        .bind(team_id)
        .bind(user_sub)
        .fetch_optional(&self.db)
        .await?;

        Ok(role.map(|r| TeamRole::from_str(&r).unwrap_or(TeamRole::Member)))
    }

    /// Members with whatever profile data is known, owners first
    pub async fn list_members(&self, team_id: &str) -> StoreResult<Vec<TeamMember>> {
        let rows = sqlx::query(
            r#"
            SELECT m.user_sub, m.role, m.created_at,
                   COALESCE(u.email, '') AS email, COALESCE(u.name, '') AS name
            FROM team_members m
            LEFT JOIN users u ON u.sub = m.user_sub
            WHERE m.team_id = ?
            ORDER BY CASE m.role WHEN 'owner' THEN 0 ELSE 1 END, m.created_at ASC
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TeamMember {
                user_sub: row.get("user_sub"),
                role: TeamRole::from_str(row.get("role")).unwrap_or(TeamRole::Member),
                email: row.get("email"),
                name: row.get("name"),
                joined_at: from_millis(row.get("created_at")),
            })
            .collect())
    }

    pub async fn create_invite(
        &self,
        token: &str,
        team_id: &str,
        email: &str,
        created_by_sub: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<TeamInvite> {
        sqlx::query(
            r#"
            INSERT INTO team_invites (token, team_id, email, created_by_sub, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(token)
        .bind(team_id)
        .bind(email)
        .bind(created_by_sub)
        .bind(to_millis(now))
        .bind(to_millis(expires_at))
        .execute(&self.db)
        .await?;

        Ok(TeamInvite {
            token: token.to_string(),
            team_id: team_id.to_string(),
            email: email.to_string(),
            created_by_sub: created_by_sub.to_string(),
            created_at: now,
            expires_at,
        })
    }

    /// Unaccepted, unexpired invites of a team
    pub async fn list_pending_invites(
        &self,
        team_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<TeamInvite>> {
        let rows = sqlx::query(
            r#"
            SELECT token, team_id, email, created_by_sub, created_at, expires_at
            FROM team_invites
            WHERE team_id = ? AND accepted_at IS NULL AND expires_at > ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(team_id)
        .bind(to_millis(now))
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TeamInvite {
                token: row.get("token"),
                team_id: row.get("team_id"),
                email: row.get("email"),
                created_by_sub: row.get("created_by_sub"),
                created_at: from_millis(row.get("created_at")),
                expires_at: from_millis(row.get("expires_at")),
            })
            .collect())
    }

    /// Accept an invite and join its team.
    ///
    /// Re-accepting an already accepted invite returns its team id without
    /// touching memberships. An expired, unaccepted invite is `NotFound`.
    /// An existing membership is left as is.
    pub async fn accept_invite(
        &self,
        token: &str,
        accepting_sub: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<String> {
        let mut tx = self.db.begin().await?;

        // Claim first so the transaction starts as a writer
        let claimed = sqlx::query(
            r#"
            UPDATE team_invites SET accepted_by_sub = ?, accepted_at = ?
            WHERE token = ? AND accepted_at IS NULL AND expires_at > ?
            "#,
        )
        .bind(accepting_sub)
        .bind(to_millis(now))
        .bind(token)
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query("SELECT team_id, accepted_at FROM team_invites WHERE token = ?")
            .bind(token)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("invite not found"))?;
        let team_id: String = row.get("team_id");

        if claimed == 0 {
            // Already accepted (possibly just now by someone else) or expired
            let accepted_at: Option<i64> = row.get("accepted_at");
            return match accepted_at {
                Some(_) => Ok(team_id),
                None => Err(StoreError::NotFound("invite not found")),
            };
        }

        sqlx::query(
            r#"
            INSERT INTO team_members (team_id, user_sub, role, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (team_id, user_sub) DO NOTHING
            "#,
        )
        .bind(&team_id)
        .bind(accepting_sub)
        .bind(TeamRole::Member.as_str())
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(team_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use chrono::Duration;

    async fn membership_count(store: &TeamStore, team_id: &str, sub: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM team_members WHERE team_id = ? AND user_sub = ?")
            .bind(team_id)
            .bind(sub)
            .fetch_one(&store.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_team_adds_owner() {
        let store = TeamStore::new(memory_pool().await);
        let now = Utc::now();

        store.create_team("t1", "Electricians", "alice", now).await.unwrap();

        assert_eq!(
            store.member_role("t1", "alice").await.unwrap(),
            Some(TeamRole::Owner)
        );
        assert_eq!(store.member_role("t1", "bob").await.unwrap(), None);

        let teams = store.list_for_user("alice").await.unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].name, "Electricians");
        assert_eq!(teams[0].role, TeamRole::Owner);
    }

    #[tokio::test]
    async fn test_create_team_is_atomic() {
        let store = TeamStore::new(memory_pool().await);
        let now = Utc::now();

        store.create_team("t1", "A", "alice", now).await.unwrap();
        // Duplicate id fails and leaves no stray membership for bob
        assert!(store.create_team("t1", "B", "bob", now).await.is_err());
        assert_eq!(membership_count(&store, "t1", "bob").await, 0);
    }

    #[tokio::test]
    async fn test_accept_invite_twice_is_idempotent() {
        let store = TeamStore::new(memory_pool().await);
        let now = Utc::now();
        store.create_team("t1", "A", "alice", now).await.unwrap();
        store
            .create_invite("inv", "t1", "", "alice", now, now + Duration::days(7))
            .await
            .unwrap();

        let first = store.accept_invite("inv", "bob", now).await.unwrap();
        let second = store
            .accept_invite("inv", "bob", now + Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(first, "t1");
        assert_eq!(second, "t1");
        assert_eq!(membership_count(&store, "t1", "bob").await, 1);
        assert_eq!(
            store.member_role("t1", "bob").await.unwrap(),
            Some(TeamRole::Member)
        );
        assert!(store.list_pending_invites("t1", now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_expired_invite() {
        let store = TeamStore::new(memory_pool().await);
        let now = Utc::now();
        store.create_team("t1", "A", "alice", now).await.unwrap();
        store
            .create_invite("inv", "t1", "", "alice", now, now + Duration::hours(1))
            .await
            .unwrap();

        let err = store
            .accept_invite("inv", "bob", now + Duration::hours(2))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(membership_count(&store, "t1", "bob").await, 0);

        assert!(matches!(
            store.accept_invite("unknown", "bob", now).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_accept_by_existing_member_keeps_role() {
        let store = TeamStore::new(memory_pool().await);
        let now = Utc::now();
        store.create_team("t1", "A", "alice", now).await.unwrap();
        store
            .create_invite("inv", "t1", "", "alice", now, now + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(store.accept_invite("inv", "alice", now).await.unwrap(), "t1");
        assert_eq!(
            store.member_role("t1", "alice").await.unwrap(),
            Some(TeamRole::Owner)
        );
    }

    #[tokio::test]
    async fn test_list_members_and_pending_invites() {
        let store = TeamStore::new(memory_pool().await);
        let now = Utc::now();
        store.create_team("t1", "A", "alice", now).await.unwrap();
        store
            .create_invite("i1", "t1", "bob@example.com", "alice", now, now + Duration::days(1))
            .await
            .unwrap();
        store
            .create_invite("i2", "t1", "", "alice", now, now - Duration::seconds(1))
            .await
            .unwrap();

        let pending = store.list_pending_invites("t1", now).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].email, "bob@example.com");

        store.accept_invite("i1", "bob", now).await.unwrap();
        let members = store.list_members("t1").await.unwrap();
        let subs: Vec<&str> = members.iter().map(|m| m.user_sub.as_str()).collect();
        assert_eq!(subs, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_racing_accepts_claim_once() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::create_pool(
            &dir.path().join("teams.db"),
            crate::db::DatabaseOptions {
                max_connections: 4,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let store = TeamStore::new(pool);
        let now = Utc::now();
        store.create_team("t1", "A", "alice", now).await.unwrap();
        store
            .create_invite("inv", "t1", "", "alice", now, now + Duration::days(1))
            .await
            .unwrap();

        let (bob, carol) = tokio::join!(
            store.accept_invite("inv", "bob", now),
            store.accept_invite("inv", "carol", now),
        );
        assert_eq!(bob.unwrap(), "t1");
        assert_eq!(carol.unwrap(), "t1");

        let joined = membership_count(&store, "t1", "bob").await
            + membership_count(&store, "t1", "carol").await;
        assert_eq!(joined, 1);
    }
}
