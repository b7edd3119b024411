//! MessageStore port - `emails` テーブルを持つ relational store

use async_trait::async_trait;

use crate::domain::{MessageId, NewMessage, PendingMessage, StoreError};

/// MessageStore は 1 本の共有セッションを持つ store client
///
/// # 設計原則
/// - セッションは `connect()` で張り直せる（古いものは捨てる）
/// - `mark_sent` / `insert_messages` は単一ステートメントの原子性だけに依存する
/// - poller と seeder が同じインスタンスを `Arc` で共有する
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Establish (or replace) the session.
    async fn connect(&self) -> Result<(), StoreError>;

    /// Trivial round trip on the current session.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Idempotent `CREATE TABLE IF NOT EXISTS` for the `emails` table.
    async fn ensure_table_exists(&self) -> Result<(), StoreError>;

    /// At most `limit` rows with `sent = false`, ordered by id.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<PendingMessage>, StoreError>;

    /// Flip the sent flag of exactly one row.
    ///
    /// Returns `StoreError::UnknownMessage` when no row has this id.
    async fn mark_sent(&self, id: MessageId) -> Result<(), StoreError>;

    /// Insert all rows in one statement with `sent = false`; returns the row count.
    async fn insert_messages(&self, messages: &[NewMessage]) -> Result<u64, StoreError>;
}
