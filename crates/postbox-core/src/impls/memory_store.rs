//! In-memory store implementation.
//!
//! Postgres の振る舞い（セッション、テーブルの有無、SERIAL 採番）を真似た開発・テスト用の store。
//! 故障注入用のフックを持つ。

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{MessageId, NewMessage, PendingMessage, StoreError};
use crate::ports::MessageStore;

/// Call counters for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub connects: u32,
    pub health_checks: u32,
    pub fetches: u32,
    pub marks: u32,
    pub inserts: u32,
}

struct InMemoryStoreState {
    /// All rows (single source of truth).
    rows: BTreeMap<MessageId, PendingMessage>,

    /// Next id to assign.
    next_id: i64,

    connected: bool,
    table_exists: bool,

    /// When false, every connect fails.
    reachable: bool,

    /// Connects that fail before one succeeds.
    failing_connects: u32,

    /// Failure returned by the next query, if any.
    query_failure: Option<StoreError>,

    stats: StoreStats,
}

impl InMemoryStoreState {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
            connected: false,
            table_exists: false,
            reachable: true,
            failing_connects: 0,
            query_failure: None,
            stats: StoreStats::default(),
        }
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, message: &NewMessage) -> MessageId {
        let id = self.allocate_id();
        self.rows.insert(
            id,
            PendingMessage {
                id,
                recipient: message.recipient.clone(),
                subject: message.subject.clone(),
                body: message.body.clone(),
                sent: false,
            },
        );
        id
    }

    /// Session and table preconditions shared by every statement.
    fn check_usable(&mut self) -> Result<(), StoreError> {
        if !self.connected {
            return Err(StoreError::NotConnected);
        }
        if !self.table_exists {
            return Err(StoreError::Query(
                "relation \"emails\" does not exist".to_string(),
            ));
        }
        if let Some(err) = self.query_failure.take() {
            return Err(err);
        }
        Ok(())
    }
}

/// In-memory [`MessageStore`].
pub struct InMemoryMessageStore {
    state: Mutex<InMemoryStoreState>,
}

impl InMemoryMessageStore {
    /// A store that is not connected yet and has no table.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryStoreState::new()),
        }
    }

    /// A connected store with the table already created.
    pub fn ready() -> Self {
        let mut state = InMemoryStoreState::new();
        state.connected = true;
        state.table_exists = true;
        Self {
            state: Mutex::new(state),
        }
    }

    /// Insert rows directly, bypassing session checks.
    pub async fn seed(&self, messages: &[NewMessage]) -> Vec<MessageId> {
        let mut state = self.state.lock().await;
        messages.iter().map(|m| state.insert(m)).collect()
    }

    /// Snapshot of all rows ordered by id.
    pub async fn messages(&self) -> Vec<PendingMessage> {
        self.state.lock().await.rows.values().cloned().collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.state
            .lock()
            .await
            .rows
            .values()
            .filter(|m| m.is_pending())
            .count()
    }

    pub async fn stats(&self) -> StoreStats {
        self.state.lock().await.stats
    }

    /// Drop the current session, as if the server closed it.
    pub async fn drop_session(&self) {
        self.state.lock().await.connected = false;
    }

    /// Make every connect (and health check) fail while `false`.
    pub async fn set_reachable(&self, reachable: bool) {
        let mut state = self.state.lock().await;
        state.reachable = reachable;
        if !reachable {
            state.connected = false;
        }
    }

    /// Fail the next `n` connects.
    pub async fn fail_connects(&self, n: u32) {
        self.state.lock().await.failing_connects = n;
    }

    /// Fail the next statement with `err`.
    pub async fn fail_next_query(&self, err: StoreError) {
        self.state.lock().await.query_failure = Some(err);
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.stats.connects += 1;
        if !state.reachable {
            return Err(StoreError::Connection("connection refused".to_string()));
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(StoreError::Connection("connection refused".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.stats.health_checks += 1;
        if state.connected && state.reachable {
            Ok(())
        } else {
            state.connected = false;
            Err(StoreError::NotConnected)
        }
    }

    async fn ensure_table_exists(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(StoreError::NotConnected);
        }
        state.table_exists = true;
        Ok(())
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<PendingMessage>, StoreError> {
        let mut state = self.state.lock().await;
        state.stats.fetches += 1;
        state.check_usable()?;
        Ok(state
            .rows
            .values()
            .filter(|m| m.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: MessageId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.stats.marks += 1;
        state.check_usable()?;
        let row = state
            .rows
            .get_mut(&id)
            .ok_or(StoreError::UnknownMessage(id))?;
        row.sent = true;
        Ok(())
    }

    async fn insert_messages(&self, messages: &[NewMessage]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state.stats.inserts += 1;
        state.check_usable()?;
        for message in messages {
            state.insert(message);
        }
        Ok(messages.len() as u64)
    }
}
