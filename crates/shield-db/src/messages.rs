//! Encrypted message repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use shield_core::{
    Error, Identity, Message, MessageRepository, Origin, PendingMessage, Result,
};

/// A raw `messages` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub sender_email: String,
    pub recipient_email: String,
    pub encrypted_content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: self.id,
            sender: Identity::new(self.sender_email)
                .map_err(|e| Error::Internal(format!("message {}: {}", self.id, e)))?,
            recipient: Identity::new(self.recipient_email)
                .map_err(|e| Error::Internal(format!("message {}: {}", self.id, e)))?,
            ciphertext: self.encrypted_content,
            created_at: self.created_at,
            origin: Origin::Remote,
            notarization: None,
        })
    }
}

/// PostgreSQL implementation of [`MessageRepository`].
#[derive(Clone)]
pub struct PgMessageRepository {
    pool: Pool<Postgres>,
}

impl PgMessageRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, sender_email, recipient_email, encrypted_content, created_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(MessageRow::into_message).transpose()
    }

    async fn list_where(&self, column: ListColumn, identity: &Identity) -> Result<Vec<Message>> {
        let sql = match column {
            ListColumn::Recipient => {
                r#"
                SELECT id, sender_email, recipient_email, encrypted_content, created_at
                FROM messages
                WHERE recipient_email = $1
                ORDER BY created_at DESC, id DESC
                "#
            }
            ListColumn::Sender => {
                r#"
                SELECT id, sender_email, recipient_email, encrypted_content, created_at
                FROM messages
                WHERE sender_email = $1
                ORDER BY created_at DESC, id DESC
                "#
            }
        };

        let rows = sqlx::query_as::<_, MessageRow>(sql)
            .bind(identity.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }
}

#[derive(Clone, Copy)]
enum ListColumn {
    Recipient,
    Sender,
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: &PendingMessage) -> Result<Message> {
        // Idempotent on id: a retry after a write that landed but timed out
        // finds the existing row instead of failing on the primary key.
        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_email, recipient_email, encrypted_content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(message.sender.as_str())
        .bind(message.recipient.as_str())
        .bind(&message.ciphertext)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.get(message.id).await?.ok_or_else(|| {
            Error::Persistence(format!("message {} missing after insert", message.id))
        })
    }

    async fn list_received(&self, recipient: &Identity) -> Result<Vec<Message>> {
        self.list_where(ListColumn::Recipient, recipient).await
    }

    async fn list_sent(&self, sender: &Identity) -> Result<Vec<Message>> {
        self.list_where(ListColumn::Sender, sender).await
    }
}
