//! PgMessageStore - PostgreSQL 実装
//!
//! プールではなく 1 本の `PgConnection` を共有セッションとして持つ。
//! health check が失敗したらセッションを捨て、`connect()` で張り直す。

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, QueryBuilder};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::config::StoreConfig;
use crate::domain::{MessageId, NewMessage, PendingMessage, StoreError};
use crate::ports::MessageStore;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS emails (
        id SERIAL PRIMARY KEY,
        recipient VARCHAR(255) NOT NULL,
        subject VARCHAR(255) NOT NULL,
        message TEXT NOT NULL,
        sent BOOLEAN DEFAULT false
    )
"#;

const FETCH_PENDING_SQL: &str = r#"
    SELECT id, recipient, subject, message, sent
    FROM emails
    WHERE sent = false
    ORDER BY id
    LIMIT $1
"#;

const MARK_SENT_SQL: &str = "UPDATE emails SET sent = true WHERE id = $1";

#[derive(Debug, sqlx::FromRow)]
struct EmailRow {
    id: i32,
    recipient: String,
    subject: String,
    message: String,
    sent: Option<bool>,
}

impl From<EmailRow> for PendingMessage {
    fn from(row: EmailRow) -> Self {
        Self {
            id: MessageId::from(row.id),
            recipient: row.recipient,
            subject: row.subject,
            body: row.message,
            sent: row.sent.unwrap_or(false),
        }
    }
}

pub struct PgMessageStore {
    options: PgConnectOptions,
    session: Mutex<Option<PgConnection>>,
}

impl PgMessageStore {
    pub fn new(config: &StoreConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);
        Self::with_options(options)
    }

    pub fn with_options(options: PgConnectOptions) -> Self {
        Self {
            options,
            session: Mutex::new(None),
        }
    }

    async fn session(&self) -> MutexGuard<'_, Option<PgConnection>> {
        self.session.lock().await
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        // 古いセッションは drop で閉じる
        *self.session().await = Some(conn);
        debug!(host = self.options.get_host(), "postgres session established");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut session = self.session().await;
        let conn = session.as_mut().ok_or(StoreError::NotConnected)?;
        if let Err(err) = sqlx::query("SELECT 1").execute(&mut *conn).await {
            *session = None;
            return Err(StoreError::Connection(err.to_string()));
        }
        Ok(())
    }

    async fn ensure_table_exists(&self) -> Result<(), StoreError> {
        let mut session = self.session().await;
        let conn = session.as_mut().ok_or(StoreError::NotConnected)?;
        sqlx::query(CREATE_TABLE_SQL)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        Ok(())
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<PendingMessage>, StoreError> {
        let mut session = self.session().await;
        let conn = session.as_mut().ok_or(StoreError::NotConnected)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, EmailRow>(FETCH_PENDING_SQL)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(rows.into_iter().map(PendingMessage::from).collect())
    }

    async fn mark_sent(&self, id: MessageId) -> Result<(), StoreError> {
        let mut session = self.session().await;
        let conn = session.as_mut().ok_or(StoreError::NotConnected)?;
        let result = sqlx::query(MARK_SENT_SQL)
            .bind(id.get())
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::Update(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownMessage(id));
        }
        Ok(())
    }

    async fn insert_messages(&self, messages: &[NewMessage]) -> Result<u64, StoreError> {
        if messages.is_empty() {
            return Ok(0);
        }
        let mut session = self.session().await;
        let conn = session.as_mut().ok_or(StoreError::NotConnected)?;

        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("INSERT INTO emails (recipient, subject, message) ");
        builder.push_values(messages, |mut row, message| {
            row.push_bind(&message.recipient)
                .push_bind(&message.subject)
                .push_bind(&message.body);
        });

        let result = builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_maps_null_flag_to_unsent() {
        let message = PendingMessage::from(EmailRow {
            id: 12,
            recipient: "test1@example.com".into(),
            subject: "Test 1".into(),
            message: "This is test message 1".into(),
            sent: None,
        });
        assert_eq!(message.id, MessageId::new(12));
        assert_eq!(message.body, "This is test message 1");
        assert!(message.is_pending());
    }

    #[tokio::test]
    async fn statements_without_session_are_not_connected() {
        let store = PgMessageStore::new(&StoreConfig::default());
        assert_eq!(store.health_check().await, Err(StoreError::NotConnected));
        assert_eq!(store.fetch_pending(1).await, Err(StoreError::NotConnected));
        assert_eq!(
            store.mark_sent(MessageId::new(1)).await,
            Err(StoreError::NotConnected)
        );
    }

    #[tokio::test]
    async fn empty_insert_is_a_no_op() {
        let store = PgMessageStore::new(&StoreConfig::default());
        assert_eq!(store.insert_messages(&[]).await, Ok(0));
    }
}
