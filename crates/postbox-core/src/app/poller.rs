//! Poller - 送信待ちの行を取り出して relay に渡す dispatch cycle
//!
//! # フロー（1 tick）
//! 1. CheckingHealth: health check、失敗したら connect を retry（使い切ったら escalate）
//! 2. Querying: テーブルを best-effort で作成し、`batch_size` 件まで取得
//! 3. Dispatching: 行ごとに send（retry、使い切ったら give up）→ MarkPolicy に従って mark
//!
//! バッチ内の行は join_all で論理的に並行に処理する。順序の保証はなく、
//! 1 行の失敗が他の行を止めることもない。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::health::{Readiness, ensure_store_ready};
use super::scheduler::Cycle;
use super::status::{CycleReport, DispatchOutcome, PollerPhase};
use crate::domain::{FatalError, MailTemplate, MarkPolicy, PendingMessage};
use crate::ports::{MessageStore, Notifier};
use crate::retry::{RetryPolicy, retry};

pub const DEFAULT_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Upper bound of rows fetched per tick.
    pub batch_size: usize,
    pub connect_policy: RetryPolicy,
    pub delivery_policy: RetryPolicy,
    pub mark_policy: MarkPolicy,
    pub template: MailTemplate,
}

pub struct Poller {
    store: Arc<dyn MessageStore>,
    notifier: Arc<dyn Notifier>,
    settings: PollerSettings,
    phase: watch::Sender<PollerPhase>,
}

impl Poller {
    pub fn new(
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn Notifier>,
        settings: PollerSettings,
    ) -> Self {
        let (phase, _) = watch::channel(PollerPhase::Idle);
        Self {
            store,
            notifier,
            settings,
            phase,
        }
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    pub fn phase(&self) -> PollerPhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<PollerPhase> {
        self.phase.subscribe()
    }

    /// Run one dispatch cycle.
    ///
    /// Only an escalated store connect is returned as an error; every other
    /// failure is logged and reflected in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport, FatalError> {
        let mut report = CycleReport::new(Utc::now());
        let result = self.cycle(&mut report).await;
        self.enter(PollerPhase::Idle);
        result.map(|()| report)
    }

    fn enter(&self, phase: PollerPhase) {
        self.phase.send_replace(phase);
    }

    async fn cycle(&self, report: &mut CycleReport) -> Result<(), FatalError> {
        self.enter(PollerPhase::CheckingHealth);
        if ensure_store_ready(self.store.as_ref(), &self.settings.connect_policy).await?
            == Readiness::Skipped
        {
            warn!("store unavailable, skipping dispatch cycle");
            return Ok(());
        }

        self.enter(PollerPhase::Querying);
        if let Err(err) = self.store.ensure_table_exists().await {
            warn!(kind = ?err.kind(), error = %err, "could not verify emails table");
        }
        let messages = match self.store.fetch_pending(self.settings.batch_size).await {
            Ok(messages) => messages,
            Err(err) => {
                error!(
                    kind = ?err.kind(),
                    error = %err,
                    "failed to query pending messages"
                );
                return Ok(());
            }
        };
        report.queried = true;
        report.fetched = messages.len();

        if messages.is_empty() {
            info!("no pending messages");
            return Ok(());
        }

        self.enter(PollerPhase::Dispatching);
        info!(count = messages.len(), "pending messages found, dispatching");
        let outcomes = join_all(messages.iter().map(|message| self.dispatch(message))).await;
        for outcome in &outcomes {
            report.record(outcome);
        }
        Ok(())
    }

    /// Send one row, then mark it according to the mark policy.
    async fn dispatch(&self, message: &PendingMessage) -> DispatchOutcome {
        let mail = self.settings.template.render(message);

        let delivered = match retry(&self.settings.delivery_policy, "mail delivery", |_| {
            self.notifier.send(&mail)
        })
        .await
        {
            Ok(()) => {
                info!(id = %message.id, recipient = %message.recipient, "message delivered");
                true
            }
            Err(err) => {
                error!(
                    id = %message.id,
                    recipient = %message.recipient,
                    attempts = err.attempts(),
                    kind = ?err.last_error().kind(),
                    error = %err.last_error(),
                    "message could not be delivered"
                );
                false
            }
        };

        let marked = if self.settings.mark_policy.should_mark(delivered) {
            match self.store.mark_sent(message.id).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(
                        id = %message.id,
                        kind = ?err.kind(),
                        error = %err,
                        "failed to mark message as sent"
                    );
                    false
                }
            }
        } else {
            debug!(id = %message.id, "leaving undelivered message pending");
            false
        };

        DispatchOutcome {
            id: message.id,
            delivered,
            marked,
        }
    }
}

#[async_trait]
impl Cycle for Poller {
    fn name(&self) -> &'static str {
        "poller"
    }

    async fn tick(&self) -> Result<(), FatalError> {
        let report = self.run_cycle().await?;
        debug!(
            fetched = report.fetched,
            delivered = report.delivered,
            failed = report.failed,
            marked = report.marked,
            "dispatch cycle finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeliveryError, NewMessage, OutgoingMail, StoreError, sample_messages};
    use crate::impls::{InMemoryMessageStore, RecordingNotifier};
    use std::time::Duration;

    fn settings(batch_size: usize, mark_policy: MarkPolicy) -> PollerSettings {
        PollerSettings {
            batch_size,
            connect_policy: RetryPolicy::store_connect(5, Duration::from_secs(5)),
            delivery_policy: RetryPolicy::delivery(5, Duration::from_secs(1)),
            mark_policy,
            template: MailTemplate::default(),
        }
    }

    fn poller(
        store: &Arc<InMemoryMessageStore>,
        notifier: &Arc<RecordingNotifier>,
        batch_size: usize,
    ) -> Poller {
        Poller::new(
            store.clone(),
            notifier.clone(),
            settings(batch_size, MarkPolicy::Always),
        )
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    /// Route events on this thread into a fresh buffer until the guard drops.
    fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test(start_paused = true)]
    async fn empty_table_sends_and_updates_nothing() {
        let (logs, _guard) = capture_logs();

        let store = Arc::new(InMemoryMessageStore::ready());
        let notifier = Arc::new(RecordingNotifier::new());

        let report = poller(&store, &notifier, 5).run_cycle().await.unwrap();

        assert!(report.queried);
        assert_eq!(report.fetched, 0);
        assert_eq!(notifier.attempts().await, 0);
        assert_eq!(store.stats().await.marks, 0);
        assert!(logs.contents().contains("no pending messages"));
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_message_is_marked_and_not_refetched() {
        let store = Arc::new(InMemoryMessageStore::ready());
        let notifier = Arc::new(RecordingNotifier::new());
        let ids = store
            .seed(&[NewMessage::new("test1@example.com", "Test 1", "body 1")])
            .await;
        let poller = poller(&store, &notifier, 5);

        let first = poller.run_cycle().await.unwrap();
        let second = poller.run_cycle().await.unwrap();

        assert_eq!((first.fetched, first.delivered, first.marked), (1, 1, 1));
        assert_eq!(second.fetched, 0);
        assert_eq!(notifier.attempts().await, 1);

        let accepted = notifier.accepted().await;
        assert_eq!(accepted[0].to, "test1@example.com");
        assert_eq!(accepted[0].subject, "Data available in the database: Test 1");

        let rows = store.messages().await;
        assert_eq!(rows[0].id, ids[0]);
        assert!(rows[0].sent);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_message_is_given_up_and_still_marked() {
        let store = Arc::new(InMemoryMessageStore::ready());
        let notifier = Arc::new(RecordingNotifier::rejecting());
        store.seed(&sample_messages()[..1]).await;

        let report = poller(&store, &notifier, 5).run_cycle().await.unwrap();

        assert_eq!(notifier.attempts().await, 5);
        assert_eq!((report.delivered, report.failed, report.marked), (0, 1, 1));
        assert_eq!(store.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delivered_only_policy_leaves_failed_rows_pending() {
        let store = Arc::new(InMemoryMessageStore::ready());
        let notifier = Arc::new(RecordingNotifier::new());
        notifier.reject_recipient("test2@example.com").await;
        store.seed(&sample_messages()).await;
        let poller = Poller::new(
            store.clone(),
            notifier.clone(),
            settings(5, MarkPolicy::DeliveredOnly),
        );

        let report = poller.run_cycle().await.unwrap();

        assert_eq!((report.delivered, report.failed, report.marked), (2, 1, 2));
        let pending = store.fetch_pending(5).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recipient, "test2@example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn batch_is_capped_and_failures_do_not_abort_the_rest() {
        let store = Arc::new(InMemoryMessageStore::ready());
        let notifier = Arc::new(RecordingNotifier::new());
        notifier.reject_recipient("test1@example.com").await;
        store.seed(&sample_messages()).await;
        store.seed(&sample_messages()).await;

        let report = poller(&store, &notifier, 4).run_cycle().await.unwrap();

        assert_eq!(report.fetched, 4);
        assert_eq!(report.marked, 4);
        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(store.pending_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_relay_failures_are_retried() {
        let store = Arc::new(InMemoryMessageStore::ready());
        let notifier = Arc::new(RecordingNotifier::failing_first(2));
        store.seed(&sample_messages()[..1]).await;

        let report = poller(&store, &notifier, 1).run_cycle().await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(notifier.attempts().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn query_failure_ends_cycle_quietly() {
        let (logs, _guard) = capture_logs();
        let store = Arc::new(InMemoryMessageStore::ready());
        let notifier = Arc::new(RecordingNotifier::new());
        store.seed(&sample_messages()).await;
        store
            .fail_next_query(StoreError::Query("canceling statement".into()))
            .await;
        let poller = poller(&store, &notifier, 5);

        let report = poller.run_cycle().await.unwrap();

        assert!(!report.queried);
        assert_eq!(notifier.attempts().await, 0);
        assert_eq!(poller.phase(), PollerPhase::Idle);
        assert!(logs.contents().contains("kind=Query"));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_session_is_reconnected_before_querying() {
        let store = Arc::new(InMemoryMessageStore::ready());
        let notifier = Arc::new(RecordingNotifier::new());
        store.seed(&sample_messages()[..1]).await;
        store.drop_session().await;

        let report = poller(&store, &notifier, 5).run_cycle().await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(store.stats().await.connects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_store_is_fatal() {
        let store = Arc::new(InMemoryMessageStore::new());
        store.set_reachable(false).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let poller = poller(&store, &notifier, 5);

        let fatal = poller.run_cycle().await.unwrap_err();

        assert_eq!(fatal.exit_code(), FatalError::STORE_UNAVAILABLE_EXIT_CODE);
        assert_eq!(store.stats().await.connects, 5);
        assert_eq!(store.stats().await.fetches, 0);
        assert_eq!(poller.phase(), PollerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_table_is_created_on_first_cycle() {
        let store = Arc::new(InMemoryMessageStore::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let report = poller(&store, &notifier, 5).run_cycle().await.unwrap();

        assert!(report.queried);
        assert_eq!(report.fetched, 0);
    }

    /// Records the poller phase seen while a send is in flight.
    struct PhaseProbe {
        phase: std::sync::Mutex<Option<watch::Receiver<PollerPhase>>>,
        seen: std::sync::Mutex<Vec<PollerPhase>>,
    }

    #[async_trait]
    impl Notifier for PhaseProbe {
        async fn send(&self, _mail: &OutgoingMail) -> Result<(), DeliveryError> {
            if let Some(rx) = self.phase.lock().unwrap().as_ref() {
                self.seen.lock().unwrap().push(*rx.borrow());
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sends_happen_while_dispatching() {
        let store = Arc::new(InMemoryMessageStore::ready());
        store.seed(&sample_messages()).await;
        let probe = Arc::new(PhaseProbe {
            phase: std::sync::Mutex::new(None),
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let poller = Poller::new(
            store.clone(),
            probe.clone(),
            settings(5, MarkPolicy::Always),
        );
        *probe.phase.lock().unwrap() = Some(poller.subscribe());

        poller.run_cycle().await.unwrap();

        assert_eq!(
            *probe.seen.lock().unwrap(),
            vec![PollerPhase::Dispatching; 3]
        );
        assert_eq!(poller.phase(), PollerPhase::Idle);
    }
}
