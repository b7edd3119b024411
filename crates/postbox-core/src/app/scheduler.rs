//! Scheduler - cycle を一定間隔で回す ticker の集合
//!
//! - `request_shutdown()` で新しい tick を止める（実行中の cycle は最後まで走る）
//! - `join()` で全 ticker の終了を待つ
//! - どれかの cycle が FatalError を返したら全 ticker を止め、`join()` がそれを返す

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::domain::FatalError;

/// A unit of periodic work.
#[async_trait]
pub trait Cycle: Send + Sync {
    fn name(&self) -> &'static str;

    async fn tick(&self) -> Result<(), FatalError>;
}

/// Cloneable handle that stops every ticker of a [`Scheduler`].
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        // receivers may already be gone
        let _ = self.tx.send(true);
    }
}

pub struct Scheduler {
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    joins: Vec<(&'static str, JoinHandle<Result<(), FatalError>>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            joins: Vec::new(),
        }
    }

    /// Spawn a ticker running `cycle` every `period`, first tick immediately.
    ///
    /// A tick that overruns delays the next one instead of bursting.
    pub fn every(&mut self, period: Duration, cycle: Arc<dyn Cycle>) {
        let name = cycle.name();
        let shutdown_tx = Arc::clone(&self.shutdown_tx);
        let shutdown_rx = self.shutdown_rx.clone();
        info!(cycle = name, period_ms = period.as_millis() as u64, "starting ticker");
        let join = tokio::spawn(ticker_loop(cycle, period, shutdown_tx, shutdown_rx));
        self.joins.push((name, join));
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Stop scheduling new ticks. In-flight cycles are not cancelled.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for every ticker; returns the first fatal error, if any.
    pub async fn join(self) -> Result<(), FatalError> {
        let mut first_fatal = None;
        for (name, join) in self.joins {
            match join.await {
                Ok(Ok(())) => {}
                Ok(Err(fatal)) => {
                    first_fatal.get_or_insert(fatal);
                }
                Err(err) => error!(cycle = name, error = %err, "ticker task panicked"),
            }
        }
        first_fatal.map_or(Ok(()), Err)
    }

    pub async fn shutdown_and_join(self) -> Result<(), FatalError> {
        self.request_shutdown();
        self.join().await
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn ticker_loop(
    cycle: Arc<dyn Cycle>,
    period: Duration,
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), FatalError> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // shutdown が来ていたら抜ける
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {
                // 次のループで判定
                continue;
            }
            _ = interval.tick() => {}
        }

        if let Err(fatal) = cycle.tick().await {
            error!(cycle = cycle.name(), error = %fatal, "fatal error, stopping all tickers");
            let _ = shutdown_tx.send(true);
            return Err(fatal);
        }
    }

    info!(cycle = cycle.name(), "ticker stopped");
    Ok(())
}
