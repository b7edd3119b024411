//! Ports - 抽象化レイヤー
//!
//! 外部システム（PostgreSQL, SMTP relay）へのインターフェースを trait として定義し、
//! poller / seeder を実装の詳細から切り離します。
//!
//! # 実装
//! - `MessageStore`: `impls::PgMessageStore`（本番）, `impls::InMemoryMessageStore`（テスト・開発）
//! - `Notifier`: `impls::SmtpNotifier`（本番）, `impls::RecordingNotifier`（テスト・開発）

pub mod message_store;
pub mod notifier;

pub use self::message_store::MessageStore;
pub use self::notifier::Notifier;
