//! Collaborator trait seams.
//!
//! The engine has no wire protocol or storage of its own; every external
//! concern is a trait injected into [`crate::JobRunner`]. Implementations
//! are expected to serialize read-modify-write on a single job (for example
//! with atomic status updates); the engine itself holds no locks.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use herald_schedule::Schedule;

use crate::error::EngineResult;
use crate::types::{Job, JobStatus, Notification};

/// Identifies the pending jobs of one chain for bulk cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingJobsFilter {
    pub environment_id: String,
    pub transaction_id: String,
    pub subscriber_id: String,
    pub template_id: String,
}

impl PendingJobsFilter {
    /// The filter matching the siblings of `job`.
    pub fn siblings_of(job: &Job) -> Self {
        Self {
            environment_id: job.environment_id.clone(),
            transaction_id: job.transaction_id.clone(),
            subscriber_id: job.subscriber_id.clone(),
            template_id: job.template_id.clone(),
        }
    }
}

/// Persistence for jobs. The runner is the only writer of job status.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn find(&self, environment_id: &str, job_id: &str) -> EngineResult<Option<Job>>;

    /// Chain lookup: the job whose `parent_id` equals `parent_id` within
    /// the environment, if any.
    async fn find_by_parent(
        &self,
        environment_id: &str,
        parent_id: &str,
    ) -> EngineResult<Option<Job>>;

    async fn update_status(
        &self,
        environment_id: &str,
        job_id: &str,
        status: JobStatus,
    ) -> EngineResult<()>;

    /// Atomically mark the job DELAYED and bump its extension counter.
    async fn mark_delayed_with_extension(
        &self,
        environment_id: &str,
        job_id: &str,
    ) -> EngineResult<()>;

    /// Bulk-cancel the PENDING jobs matching the filter.
    async fn cancel_pending(&self, filter: &PendingJobsFilter) -> EngineResult<()>;

    /// All DIGEST jobs sharing a transaction, recipient, and template. The
    /// cancellation helper filters these down to an active follower.
    async fn find_digest_jobs(
        &self,
        environment_id: &str,
        transaction_id: &str,
        subscriber_id: &str,
        template_id: &str,
    ) -> EngineResult<Vec<Job>>;
}

/// Read-only lookup of the owning workflow-trigger instance.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn find(
        &self,
        environment_id: &str,
        notification_id: &str,
    ) -> EngineResult<Option<Notification>>;
}

/// Status recorded in a step-run audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRunStatus {
    Running,
    Completed,
    Failed,
    Canceled,
    Skipped,
    Delayed,
}

/// One append-only audit entry for a job execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRun {
    pub status: StepRunStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Human-readable context, e.g. "skipped by step conditions".
    pub detail: Option<String>,
}

impl StepRun {
    pub fn running() -> Self {
        Self {
            status: StepRunStatus::Running,
            error_code: None,
            error_message: None,
            detail: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            status: StepRunStatus::Completed,
            error_code: None,
            error_message: None,
            detail: None,
        }
    }

    pub fn delayed(detail: impl Into<String>) -> Self {
        Self {
            status: StepRunStatus::Delayed,
            error_code: None,
            error_message: None,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: StepRunStatus::Skipped,
            error_code: None,
            error_message: None,
            detail: Some(detail.into()),
        }
    }

    pub fn canceled(detail: impl Into<String>) -> Self {
        Self {
            status: StepRunStatus::Canceled,
            error_code: None,
            error_message: None,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            status: StepRunStatus::Failed,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
            detail: None,
        }
    }
}

/// Append-only audit sink for step runs.
#[async_trait]
pub trait StepRunSink: Send + Sync {
    async fn record(&self, job: &Job, run: StepRun) -> EngineResult<()>;
}

/// Supplies a recipient's availability schedule, if they configured one.
#[async_trait]
pub trait ScheduleProvider: Send + Sync {
    async fn schedule_for(
        &self,
        environment_id: &str,
        organization_id: &str,
        subscriber_id: &str,
    ) -> EngineResult<Option<Schedule>>;
}

/// The slice of subscriber data the engine consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriberInfo {
    /// IANA zone name. Unparseable or absent means UTC wall-clock
    /// evaluation.
    pub timezone: Option<String>,
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn find(&self, subscriber_id: &str) -> EngineResult<Option<SubscriberInfo>>;
}

/// Attachment content fetched for a send.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub reference: String,
    pub bytes: Vec<u8>,
}

/// Scoped acquisition of attachment payloads. `release` is called on every
/// exit path so temporary storage never leaks.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn fetch(&self, references: &[String]) -> EngineResult<Vec<Attachment>>;
    async fn release(&self, references: &[String]) -> EngineResult<()>;
}

/// Everything the sender needs to render and deliver one step.
#[derive(Debug)]
pub struct SendContext<'a> {
    pub job: &'a Job,
    pub notification: &'a Notification,
    pub attachments: &'a [Attachment],
}

/// Outcome reported by the message sender.
///
/// These are handled statuses, never errors. A transient condition the
/// outer queue should retry is reported by returning
/// [`crate::EngineError::Backoff`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    Failed { error_message: String },
    Skipped,
}

/// Delivers one step through its channel.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, context: SendContext<'_>) -> EngineResult<SendOutcome>;
}

/// Outputs of a bridge execution for a DELAY/DIGEST step outside the
/// recipient's schedule.
#[derive(Debug, Clone, Default)]
pub struct BridgeResponse {
    pub extend_to_schedule: Option<bool>,
}

/// External workflow-bridge execution deciding whether a DELAY/DIGEST step
/// should wait for the schedule to reopen.
#[async_trait]
pub trait BridgeExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> EngineResult<BridgeResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueStatus {
    /// Handed off; a future invocation will execute it.
    Queued,
    /// Step conditions rejected the job; the chain continues past it.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub step_status: EnqueueStatus,
}

/// Enqueues the next job of a chain, evaluating step-level conditions.
#[async_trait]
pub trait NextJobEnqueuer: Send + Sync {
    async fn add(&self, job: &Job) -> EngineResult<EnqueueOutcome>;
}

/// Re-enqueues a DELAYED job after a delay.
#[async_trait]
pub trait DelayedJobQueue: Send + Sync {
    async fn queue_job(&self, job: &Job, delay: Duration) -> EngineResult<()>;
}

/// Finalization of the overall workflow run once a chain ends or halts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryLifecycleUpdate {
    pub notification_id: String,
    pub environment_id: String,
    pub organization_id: String,
    pub subscriber_id: String,
    pub error: Option<String>,
}

#[async_trait]
pub trait WorkflowRunUpdater: Send + Sync {
    async fn update_delivery_lifecycle(
        &self,
        update: DeliveryLifecycleUpdate,
    ) -> EngineResult<()>;
}

/// Boolean switch controlling whether schedule gating is active at all.
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    async fn schedule_gating_enabled(&self, environment_id: &str) -> bool;
}

/// Handles completion of a snoozed in-app notification. The unsnooze path
/// manages its own chain continuation.
#[async_trait]
pub trait UnsnoozeProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> EngineResult<()>;
}
