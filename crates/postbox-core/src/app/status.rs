//! Status - cycle の状態とレポート

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::MessageId;

/// Poller の状態遷移: Idle → CheckingHealth → Querying → Dispatching → Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerPhase {
    Idle,
    CheckingHealth,
    Querying,
    Dispatching,
}

/// Seeder の状態遷移: Idle → CheckingHealth → Inserting → Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeederPhase {
    Idle,
    CheckingHealth,
    Inserting,
}

/// Result of sending and marking one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub id: MessageId,
    pub delivered: bool,
    pub marked: bool,
}

/// Summary of one dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// False when the store was unreachable or the query failed.
    pub queried: bool,
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
    pub marked: usize,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            queried: false,
            fetched: 0,
            delivered: 0,
            failed: 0,
            marked: 0,
        }
    }

    pub fn record(&mut self, outcome: &DispatchOutcome) {
        if outcome.delivered {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
        if outcome.marked {
            self.marked += 1;
        }
    }
}

/// Summary of one seeding cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub started_at: DateTime<Utc>,
    pub inserted: u64,
}
