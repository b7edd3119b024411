//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Poller**: 未送信メールの取得→送信→送信済みマーク
//! - **Seeder**: サンプル行の定期投入
//! - **Scheduler**: 2 つのタイマーと停止シグナルの管理
//! - **health**: store の health check と再接続

pub mod builder;
pub mod health;
pub mod poller;
pub mod scheduler;
pub mod seeder;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::health::Readiness;
pub use self::poller::{DEFAULT_BATCH_SIZE, Poller, PollerSettings};
pub use self::scheduler::{Cycle, Scheduler, ShutdownHandle};
pub use self::seeder::Seeder;
pub use self::status::{CycleReport, DispatchOutcome, PollerPhase, SeedReport, SeederPhase};
