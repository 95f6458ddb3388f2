//! Public key registry repository.
//!
//! One row per identity in `user_keys`. Writes are insert-if-absent so the
//! first key published for an identity stays authoritative.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use tracing::debug;

use shield_core::{Error, Identity, InsertOutcome, KeyRepository, PublicKeyPem, Result};

/// A raw `user_keys` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserKeyRow {
    pub email: String,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
}

/// PostgreSQL implementation of [`KeyRepository`].
#[derive(Clone)]
pub struct PgKeyRepository {
    pool: Pool<Postgres>,
}

impl PgKeyRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Fetch the full row for an identity.
    pub async fn get_row(&self, identity: &Identity) -> Result<Option<UserKeyRow>> {
        sqlx::query_as::<_, UserKeyRow>(
            r#"
            SELECT email, public_key, created_at
            FROM user_keys
            WHERE email = $1
            "#,
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }
}

#[async_trait]
impl KeyRepository for PgKeyRepository {
    async fn fetch_public_key(&self, identity: &Identity) -> Result<Option<String>> {
        let key: Option<(String,)> =
            sqlx::query_as("SELECT public_key FROM user_keys WHERE email = $1")
                .bind(identity.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(key.map(|(pem,)| pem))
    }

    async fn insert_if_absent(
        &self,
        identity: &Identity,
        public_key: &PublicKeyPem,
    ) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_keys (email, public_key)
            VALUES ($1, $2)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(identity.as_str())
        .bind(public_key.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let outcome = if result.rows_affected() == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyPresent
        };
        debug!(
            subsystem = "db",
            db_table = "user_keys",
            identity = %identity,
            ?outcome,
            "Key insert-if-absent"
        );
        Ok(outcome)
    }

    async fn compare_and_swap(
        &self,
        identity: &Identity,
        expected: &str,
        public_key: &PublicKeyPem,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_keys
            SET public_key = $3
            WHERE email = $1 AND public_key = $2
            "#,
        )
        .bind(identity.as_str())
        .bind(expected)
        .bind(public_key.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }
}
