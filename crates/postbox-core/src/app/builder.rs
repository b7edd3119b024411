//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! store / notifier のクライアントは起動時に 1 度だけ作り、`Arc` で poller と
//! seeder に渡す。グローバルな共有セッションは持たない。
//!
//! # Fail-fast 設計
//! - build() 時に間隔・バッチサイズ・試行回数を検証
//! - 不正な値があれば BuildError を返す

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::health::{Readiness, connect_with_retry};
use super::poller::{DEFAULT_BATCH_SIZE, Poller, PollerSettings};
use super::scheduler::Scheduler;
use super::seeder::Seeder;
use crate::config::Config;
use crate::domain::{FatalError, MailTemplate, MarkPolicy};
use crate::ports::{MessageStore, Notifier};
use crate::retry::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY, DEFAULT_DELIVERY_ATTEMPTS,
    DEFAULT_DELIVERY_BASE_DELAY, RetryPolicy,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_SEED_INTERVAL: Duration = Duration::from_secs(10);

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(store, notifier)
///     .poll_interval(Duration::from_secs(5))
///     .batch_size(5)
///     .build()?;
/// let scheduler = app.start().await?;
/// ```
pub struct AppBuilder {
    store: Arc<dyn MessageStore>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    seed_interval: Option<Duration>,
    batch_size: usize,
    connect_policy: RetryPolicy,
    delivery_policy: RetryPolicy,
    mark_policy: MarkPolicy,
    template: MailTemplate,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("{0} interval must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("{0} retry policy needs at least one attempt")]
    ZeroAttempts(&'static str),
}

impl AppBuilder {
    pub fn new(store: Arc<dyn MessageStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            poll_interval: DEFAULT_POLL_INTERVAL,
            seed_interval: Some(DEFAULT_SEED_INTERVAL),
            batch_size: DEFAULT_BATCH_SIZE,
            connect_policy: RetryPolicy::store_connect(
                DEFAULT_CONNECT_ATTEMPTS,
                DEFAULT_CONNECT_DELAY,
            ),
            delivery_policy: RetryPolicy::delivery(
                DEFAULT_DELIVERY_ATTEMPTS,
                DEFAULT_DELIVERY_BASE_DELAY,
            ),
            mark_policy: MarkPolicy::Always,
            template: MailTemplate::default(),
        }
    }

    /// Builder pre-filled from `config`.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::new(store, notifier)
            .poll_interval(config.poll_interval())
            .seed_interval(config.seed_interval())
            .batch_size(config.schedule.batch_size)
            .connect_policy(config.connect_policy())
            .delivery_policy(config.delivery_policy())
            .mark_policy(config.dispatch.mark_policy)
            .template(config.mail_template())
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// `None` disables the seeder.
    pub fn seed_interval(mut self, interval: Option<Duration>) -> Self {
        self.seed_interval = interval;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn connect_policy(mut self, policy: RetryPolicy) -> Self {
        self.connect_policy = policy;
        self
    }

    pub fn delivery_policy(mut self, policy: RetryPolicy) -> Self {
        self.delivery_policy = policy;
        self
    }

    pub fn mark_policy(mut self, policy: MarkPolicy) -> Self {
        self.mark_policy = policy;
        self
    }

    pub fn template(mut self, template: MailTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        if self.batch_size == 0 {
            return Err(BuildError::ZeroBatchSize);
        }
        if self.poll_interval.is_zero() {
            return Err(BuildError::ZeroInterval("poll"));
        }
        if self.seed_interval.is_some_and(|i| i.is_zero()) {
            return Err(BuildError::ZeroInterval("seed"));
        }
        if self.connect_policy.max_attempts == 0 {
            return Err(BuildError::ZeroAttempts("connect"));
        }
        if self.delivery_policy.max_attempts == 0 {
            return Err(BuildError::ZeroAttempts("delivery"));
        }

        let poller = Poller::new(
            Arc::clone(&self.store),
            self.notifier,
            PollerSettings {
                batch_size: self.batch_size,
                connect_policy: self.connect_policy.clone(),
                delivery_policy: self.delivery_policy,
                mark_policy: self.mark_policy,
                template: self.template,
            },
        );
        let seeder = Seeder::new(Arc::clone(&self.store), self.connect_policy.clone());

        Ok(App {
            store: self.store,
            connect_policy: self.connect_policy,
            poller: Arc::new(poller),
            seeder: Arc::new(seeder),
            poll_interval: self.poll_interval,
            seed_interval: self.seed_interval,
        })
    }
}

/// App は構築済みの poller / seeder と共有 store を持つ
pub struct App {
    store: Arc<dyn MessageStore>,
    connect_policy: RetryPolicy,
    poller: Arc<Poller>,
    seeder: Arc<Seeder>,
    poll_interval: Duration,
    seed_interval: Option<Duration>,
}

impl App {
    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    pub fn seeder(&self) -> &Arc<Seeder> {
        &self.seeder
    }

    /// Startup connect (escalating) and best-effort table creation.
    pub async fn bootstrap(&self) -> Result<(), FatalError> {
        if connect_with_retry(self.store.as_ref(), &self.connect_policy).await?
            == Readiness::Skipped
        {
            warn!("store unavailable at startup, cycles will retry");
            return Ok(());
        }
        match self.store.ensure_table_exists().await {
            Ok(()) => info!("emails table verified"),
            Err(err) => warn!(
                kind = ?err.kind(),
                error = %err,
                "could not create emails table"
            ),
        }
        Ok(())
    }

    /// Bootstrap, then start the poller (and seeder, if enabled) tickers.
    pub async fn start(self) -> Result<Scheduler, FatalError> {
        self.bootstrap().await?;

        let mut scheduler = Scheduler::new();
        scheduler.every(self.poll_interval, self.poller);
        match self.seed_interval {
            Some(interval) => scheduler.every(interval, self.seeder),
            None => info!("seeding disabled"),
        }
        Ok(scheduler)
    }
}
