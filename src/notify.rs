use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AuthResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    Verification,
    PasswordReset,
    Welcome,
}

#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub recipient: String,
    pub payload: Value,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
}

/// Delivery collaborator (mail provider, webhook, ...). Failures are retried
/// by the dispatcher and never surface to the operation that enqueued the
/// job.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, job: &NotificationJob) -> AuthResult<()>;
}

/// Stand-in delivery backend that only logs. Useful until a real provider
/// is wired in.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, job: &NotificationJob) -> AuthResult<()> {
        log::info!(
            "delivering {:?} notification {} to {}",
            job.kind,
            job.id,
            job.recipient
        );
        Ok(())
    }
}

/// Per-retry backoff multipliers over the configured base delay, indexed by
/// failed-attempt count; attempts past the table reuse the last entry.
const RETRY_BACKOFF_MULTIPLIERS: [u32; 3] = [1, 2, 3];

/// Bounded in-memory work queue for outbound notices. Enqueue is
/// fire-and-forget from the caller's perspective; a separate dispatcher
/// drains it.
pub struct NotificationQueue {
    jobs: Mutex<Vec<NotificationJob>>,
    max_attempts: u32,
    retry_base: Duration,
}

impl NotificationQueue {
    pub fn new(max_attempts: u32, retry_base_secs: u64) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            max_attempts,
            retry_base: Duration::seconds(retry_base_secs as i64),
        }
    }

    pub async fn enqueue(&self, kind: NotificationKind, recipient: &str, payload: Value) -> Uuid {
        let now = Utc::now();
        let job = NotificationJob {
            id: Uuid::new_v4(),
            kind,
            recipient: recipient.to_string(),
            payload,
            attempts: 0,
            created_at: now,
            scheduled_for: now,
        };
        let id = job.id;
        self.jobs.lock().await.push(job);
        id
    }

    /// Number of jobs waiting (including ones backing off), excluding any
    /// job currently in flight.
    pub async fn depth(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let index = (attempt.max(1) as usize - 1).min(RETRY_BACKOFF_MULTIPLIERS.len() - 1);
        self.retry_base * RETRY_BACKOFF_MULTIPLIERS[index] as i32
    }

    /// Atomically remove and return the first job that is due. Claiming and
    /// removal happen under one lock so a job can never be delivered twice
    /// or lost between queue and worker.
    async fn claim_due(&self, now: DateTime<Utc>) -> Option<NotificationJob> {
        let mut jobs = self.jobs.lock().await;
        let index = jobs.iter().position(|job| job.scheduled_for <= now)?;
        Some(jobs.remove(index))
    }

    async fn push_back(&self, job: NotificationJob) {
        self.jobs.lock().await.push(job);
    }
}

/// Drain loop pairing the queue with a delivery backend.
pub struct NotificationDispatcher {
    queue: Arc<NotificationQueue>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(queue: Arc<NotificationQueue>, notifier: Arc<dyn Notifier>) -> Self {
        Self { queue, notifier }
    }

    /// Run the drain loop forever. Spawn as a background task.
    pub async fn run(self) -> ! {
        log::info!("notification dispatcher started");
        loop {
            let processed = self.drain_once(Utc::now()).await;
            if processed == 0 {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }

    /// Process every job due at `now`; returns how many were attempted.
    /// Failed jobs are rescheduled with backoff until the attempt cap, then
    /// dropped with an error log.
    pub async fn drain_once(&self, now: DateTime<Utc>) -> usize {
        let mut processed = 0;

        while let Some(mut job) = self.queue.claim_due(now).await {
            processed += 1;
            match self.notifier.deliver(&job).await {
                Ok(()) => {
                    log::debug!("notification {} delivered to {}", job.id, job.recipient);
                }
                Err(err) => {
                    if job.attempts < self.queue.max_attempts {
                        job.attempts += 1;
                        job.scheduled_for = now + self.queue.retry_delay(job.attempts);
                        log::warn!(
                            "notification {} failed (attempt {}): {err}; retrying",
                            job.id,
                            job.attempts
                        );
                        self.queue.push_back(job).await;
                    } else {
                        log::error!(
                            "notification {} to {} dropped after {} attempts: {err}",
                            job.id,
                            job.recipient,
                            job.attempts + 1
                        );
                    }
                }
            }
        }

        processed
    }
}
