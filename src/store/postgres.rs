//! Postgres-backed identity and session repositories

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{with_timeout, IdentityRepository, SessionRepository, StoreError, StoreResult};
use crate::auth::WalletAddress;
use crate::models::{Identity, NewIdentity, Preferences, Session};

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut => StoreError::Timeout("database pool timed out".to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(e.to_string())
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn parse_stored_address(raw: &str) -> StoreResult<WalletAddress> {
    WalletAddress::parse(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    wallet_address: String,
    display_name: String,
    email: Option<String>,
    preferences: Json<Preferences>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = StoreError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        Ok(Identity {
            id: row.id,
            wallet_address: parse_stored_address(&row.wallet_address)?,
            display_name: row.display_name,
            email: row.email,
            preferences: row.preferences.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    identity_id: Uuid,
    wallet_address: String,
    expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            session_id: row.session_id,
            identity_id: row.identity_id,
            wallet_address: parse_stored_address(&row.wallet_address)?,
            expires_at: row.expires_at,
        })
    }
}

const IDENTITY_COLUMNS: &str =
    "id, wallet_address, display_name, email, preferences, created_at, updated_at";

/// Identities table access
#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn upsert(&self, identity: &NewIdentity) -> StoreResult<Identity> {
        let sql = format!(
            r#"
            INSERT INTO identities (id, wallet_address, display_name, email, preferences)
            VALUES ($1, $2, $3, $4, '{{}}'::jsonb)
            ON CONFLICT (wallet_address) DO UPDATE
            SET display_name = COALESCE($5, identities.display_name),
                email = COALESCE($4, identities.email),
                updated_at = NOW()
            RETURNING {}
            "#,
            IDENTITY_COLUMNS
        );

        let row = with_timeout(self.op_timeout, "identity.upsert", async {
            sqlx::query_as::<_, IdentityRow>(&sql)
                .bind(Uuid::new_v4())
                .bind(identity.wallet_address.as_str())
                .bind(identity.initial_display_name())
                .bind(identity.email.as_deref())
                .bind(identity.display_name.as_deref())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)
        })
        .await?;

        Identity::try_from(row)
    }

    async fn find_by_address(&self, address: &WalletAddress) -> StoreResult<Option<Identity>> {
        let sql = format!(
            "SELECT {} FROM identities WHERE wallet_address = $1",
            IDENTITY_COLUMNS
        );

        let row = with_timeout(self.op_timeout, "identity.find_by_address", async {
            sqlx::query_as::<_, IdentityRow>(&sql)
                .bind(address.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)
        })
        .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn update_preferences(
        &self,
        address: &WalletAddress,
        preferences: &Preferences,
    ) -> StoreResult<Option<Identity>> {
        let sql = format!(
            r#"
            UPDATE identities
            SET preferences = $2, updated_at = NOW()
            WHERE wallet_address = $1
            RETURNING {}
            "#,
            IDENTITY_COLUMNS
        );

        let row = with_timeout(self.op_timeout, "identity.update_preferences", async {
            sqlx::query_as::<_, IdentityRow>(&sql)
                .bind(address.as_str())
                .bind(Json(preferences))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)
        })
        .await?;

        row.map(Identity::try_from).transpose()
    }
}

/// Sessions table access
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn insert(&self, session: &Session) -> StoreResult<()> {
        with_timeout(self.op_timeout, "session.insert", async {
            sqlx::query(
                r#"
                INSERT INTO sessions (session_id, identity_id, wallet_address, expires_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&session.session_id)
            .bind(session.identity_id)
            .bind(session.wallet_address.as_str())
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)
        })
        .await?;

        Ok(())
    }

    async fn find_active(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        let row = with_timeout(self.op_timeout, "session.find_active", async {
            sqlx::query_as::<_, SessionRow>(
                r#"
                SELECT session_id, identity_id, wallet_address, expires_at
                FROM sessions
                WHERE session_id = $1 AND expires_at > $2
                "#,
            )
            .bind(session_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
        })
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        with_timeout(self.op_timeout, "session.delete", async {
            sqlx::query("DELETE FROM sessions WHERE session_id = $1")
                .bind(session_id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)
        })
        .await?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = with_timeout(self.op_timeout, "session.purge_expired", async {
            sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)
        })
        .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> StoreResult<()> {
        with_timeout(self.op_timeout, "session.ping", async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)
        })
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn pool() -> PgPool {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_identity_upsert_coalesces() {
        let repository = PgIdentityRepository::new(pool().await, Duration::from_secs(5));
        let address = WalletAddress::from_bytes(rand::random());

        let created = repository
            .upsert(&NewIdentity {
                wallet_address: address.clone(),
                display_name: Some("alice".to_string()),
                email: Some("alice@example.com".to_string()),
            })
            .await
            .unwrap();
        let updated = repository
            .upsert(&NewIdentity::new(address.clone()))
            .await
            .unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.display_name, "alice");
        assert_eq!(updated.email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_session_lifecycle() {
        let pool = pool().await;
        let identities = PgIdentityRepository::new(pool.clone(), Duration::from_secs(5));
        let sessions = PgSessionRepository::new(pool, Duration::from_secs(5));
        let identity = identities
            .upsert(&NewIdentity::new(
                WalletAddress::from_bytes(rand::random()),
            ))
            .await
            .unwrap();

        let now = Utc::now();
        let session = Session {
            session_id: crate::auth::session::generate_session_id(),
            identity_id: identity.id,
            wallet_address: identity.wallet_address.clone(),
            expires_at: now + chrono::Duration::seconds(60),
        };
        sessions.insert(&session).await.unwrap();

        let found = sessions
            .find_active(&session.session_id, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.session_id, session.session_id);

        sessions.delete(&session.session_id).await.unwrap();
        sessions.delete(&session.session_id).await.unwrap();
        assert!(sessions
            .find_active(&session.session_id, now)
            .await
            .unwrap()
            .is_none());
    }
}
