//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **PgMessageStore**: PostgreSQL の `emails` テーブル
//! - **InMemoryMessageStore**: 開発・テスト用の store（故障注入つき）
//! - **SmtpNotifier**: lettre による SMTP relay への送信
//! - **RecordingNotifier**: 開発・テスト用の notifier（送信を記録するだけ）

pub mod memory_store;
pub mod postgres_store;
pub mod recording_notifier;
pub mod smtp_notifier;

pub use self::memory_store::{InMemoryMessageStore, StoreStats};
pub use self::postgres_store::PgMessageStore;
pub use self::recording_notifier::RecordingNotifier;
pub use self::smtp_notifier::SmtpNotifier;
