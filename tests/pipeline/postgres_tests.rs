//! Archive rows in PostgreSQL.
//!
//! Needs a database at `DATABASE_URL`; skipped when it is unset or
//! unreachable.

use chrono::Utc;
use sqlx::PgPool;
use stock_chat::config::DatabaseSettings;
use stock_chat::domain::{MessageRepository, StoredMessage};
use stock_chat::infrastructure::database::{create_pool, run_migrations};
use stock_chat::infrastructure::repositories::PgMessageRepository;
use uuid::Uuid;

async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let settings = DatabaseSettings {
        url,
        max_connections: 2,
        min_connections: 0,
        acquire_timeout: 3,
        run_migrations: true,
    };
    let pool = match create_pool(&settings).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("database unreachable ({e}), skipping");
            return None;
        }
    };
    run_migrations(&pool).await.unwrap();
    Some(pool)
}

#[tokio::test]
async fn test_saving_a_line_twice_keeps_one_row() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let repo = PgMessageRepository::new(pool.clone());
    let channel = format!("test-{}", &Uuid::new_v4().simple().to_string()[..12]);
    let message = StoredMessage {
        channel: channel.clone(),
        user: "alice".into(),
        text: "hello twice".into(),
        timestamp: Utc::now(),
    };

    repo.save(&message).await.unwrap();
    repo.save(&message).await.unwrap();

    let stored = repo.find_recent(&channel, 50).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text, "hello twice");

    // A different line at the same instant is still a separate row.
    let other = StoredMessage {
        text: "hello once".into(),
        ..message
    };
    repo.save(&other).await.unwrap();
    assert_eq!(repo.find_recent(&channel, 50).await.unwrap().len(), 2);

    sqlx::query("DELETE FROM messages WHERE channel_name = $1")
        .bind(&channel)
        .execute(&pool)
        .await
        .unwrap();
}
