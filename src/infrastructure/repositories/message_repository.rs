//! Message Repository Implementation
//!
//! PostgreSQL storage for archived chat lines.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{MessageRepository, StoredMessage};
use crate::shared::error::AppError;

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type, maps to the messages table.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    channel_name: String,
    user_name: String,
    message_text: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            channel: row.channel_name,
            user: row.user_name,
            text: row.message_text,
            timestamp: row.created_at,
        }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    /// Saving the same line twice (a redelivery) keeps one row.
    async fn save(&self, message: &StoredMessage) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO messages (channel_name, user_name, message_text, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (channel_name, user_name, created_at, md5(message_text)) DO NOTHING
            "#,
        )
        .bind(&message.channel)
        .bind(&message.user)
        .bind(&message.text)
        .bind(message.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Newest `limit` rows, re-ordered oldest first.
    async fn find_recent(&self, channel: &str, limit: usize) -> Result<Vec<StoredMessage>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT channel_name, user_name, message_text, created_at
            FROM (
                SELECT id, channel_name, user_name, message_text, created_at
                FROM messages
                WHERE channel_name = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2
            ) AS recent
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(channel)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StoredMessage::from).collect())
    }
}
