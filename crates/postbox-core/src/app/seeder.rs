//! Seeder - サンプル行を定期的に投入する seeding cycle
//!
//! 毎 tick 無条件に同じ 3 行を insert する（重複排除なし）。
//! 連続運転するとテーブルは際限なく大きくなるが、それは受け入れている挙動。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::health::{Readiness, ensure_store_ready};
use super::scheduler::Cycle;
use super::status::{SeedReport, SeederPhase};
use crate::domain::{FatalError, NewMessage, sample_messages};
use crate::ports::MessageStore;
use crate::retry::RetryPolicy;

pub struct Seeder {
    store: Arc<dyn MessageStore>,
    connect_policy: RetryPolicy,
    samples: Vec<NewMessage>,
    phase: watch::Sender<SeederPhase>,
}

impl Seeder {
    /// Seeder inserting the fixed sample set.
    pub fn new(store: Arc<dyn MessageStore>, connect_policy: RetryPolicy) -> Self {
        Self::with_samples(store, connect_policy, sample_messages())
    }

    pub fn with_samples(
        store: Arc<dyn MessageStore>,
        connect_policy: RetryPolicy,
        samples: Vec<NewMessage>,
    ) -> Self {
        let (phase, _) = watch::channel(SeederPhase::Idle);
        Self {
            store,
            connect_policy,
            samples,
            phase,
        }
    }

    pub fn phase(&self) -> SeederPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SeederPhase> {
        self.phase.subscribe()
    }

    /// Run one seeding cycle.
    pub async fn run_cycle(&self) -> Result<SeedReport, FatalError> {
        let mut report = SeedReport {
            started_at: Utc::now(),
            inserted: 0,
        };
        let result = self.cycle(&mut report).await;
        self.phase.send_replace(SeederPhase::Idle);
        result.map(|()| report)
    }

    async fn cycle(&self, report: &mut SeedReport) -> Result<(), FatalError> {
        self.phase.send_replace(SeederPhase::CheckingHealth);
        if ensure_store_ready(self.store.as_ref(), &self.connect_policy).await? == Readiness::Skipped {
            warn!("store unavailable, skipping seeding cycle");
            return Ok(());
        }

        self.phase.send_replace(SeederPhase::Inserting);
        match self.store.insert_messages(&self.samples).await {
            Ok(inserted) => {
                report.inserted = inserted;
                info!(inserted, "sample messages inserted");
            }
            Err(err) => error!(
                kind = ?err.kind(),
                error = %err,
                "failed to insert sample messages"
            ),
        }
        Ok(())
    }
}

#[async_trait]
impl Cycle for Seeder {
    fn name(&self) -> &'static str {
        "seeder"
    }

    async fn tick(&self) -> Result<(), FatalError> {
        let report = self.run_cycle().await?;
        debug!(inserted = report.inserted, "seeding cycle finished");
        Ok(())
    }
}
