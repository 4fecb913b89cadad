//! PostgreSQL session store: one JSONB document per token.

use chrono::Utc;
use sqlx::PgPool;

use super::{SessionStore, SessionToken, UserSession};
use crate::error::OrderResult;

/// [`SessionStore`] persisting sessions in the `sessions` table.
#[derive(Debug, Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    /// Creates a store on top of an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SessionStore for PostgresSessionStore {
    async fn load(&self, token: SessionToken) -> OrderResult<UserSession> {
        let data = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM sessions WHERE token = $1",
        )
        .bind(*token.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match data {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(UserSession::default()),
        }
    }

    async fn save(&self, token: SessionToken, session: &UserSession) -> OrderResult<()> {
        let data = serde_json::to_value(session)?;
        sqlx::query(
            "INSERT INTO sessions (token, data, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (token) DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at",
        )
        .bind(*token.as_uuid())
        .bind(data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, token: SessionToken) -> OrderResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(*token.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
