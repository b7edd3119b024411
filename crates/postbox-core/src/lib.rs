//! postbox-core
//!
//! Polls a Postgres table for unsent emails, relays them over SMTP and marks
//! them sent; a second timer seeds the table with sample rows.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, message, mail, errors）
//! - **ports**: 抽象化レイヤー（MessageStore, Notifier）
//! - **impls**: 実装（Postgres / SMTP と開発用の in-memory 版）
//! - **retry**: リトライポリシーと backoff
//! - **app**: アプリケーションロジック（builder, poller, seeder, scheduler）
//! - **config**: TOML + 環境変数の設定
//! - **observability**: tracing subscriber の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod retry;
