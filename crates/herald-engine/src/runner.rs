//! Job execution.
//!
//! [`JobRunner::execute`] advances one job through its lifecycle:
//! cancellation resolution, schedule gating, delivery, outcome recording,
//! and chain advancement. The runner is invoked by an external queue
//! consumer; a DELAYED job is re-dispatched by an external timer and enters
//! `execute` again, so re-entrant suspension is explicit re-dispatch rather
//! than a held task.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use herald_schedule::{is_within_schedule, next_available_time};

use crate::cancellation::{self, CancellationDecision};
use crate::error::{EngineError, EngineResult};
use crate::ports::{
    AttachmentStore, BridgeExecutor, DelayedJobQueue, DeliveryLifecycleUpdate, EnqueueStatus,
    FeatureFlags, JobStore, MessageSender, NextJobEnqueuer, NotificationStore, PendingJobsFilter,
    ScheduleProvider, SendContext, SendOutcome, StepRun, StepRunSink, SubscriberStore,
    UnsnoozeProcessor, WorkflowRunUpdater,
};
use crate::types::{Job, JobStatus, Notification};

/// Maximum times a DELAY/DIGEST job may be extended to the next open
/// schedule window. The only built-in bound preventing indefinite
/// rescheduling.
pub const MAX_SCHEDULE_EXTENSIONS: u32 = 3;

const ERROR_CODE_DELIVERY: &str = "delivery_failed";
const ERROR_CODE_EXECUTION: &str = "execution_error";
const ERROR_CODE_ENQUEUE: &str = "enqueue_failed";

/// Identifies the job one invocation should execute.
#[derive(Debug, Clone)]
pub struct ExecuteCommand {
    pub environment_id: String,
    pub job_id: String,
}

/// The collaborators a runner is wired with.
pub struct RunnerDeps {
    pub jobs: Arc<dyn JobStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub step_runs: Arc<dyn StepRunSink>,
    pub schedules: Arc<dyn ScheduleProvider>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub sender: Arc<dyn MessageSender>,
    pub bridge: Arc<dyn BridgeExecutor>,
    pub next_jobs: Arc<dyn NextJobEnqueuer>,
    pub delayed_jobs: Arc<dyn DelayedJobQueue>,
    pub workflow_runs: Arc<dyn WorkflowRunUpdater>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub flags: Arc<dyn FeatureFlags>,
    pub unsnooze: Arc<dyn UnsnoozeProcessor>,
}

/// What the schedule gate decided for a job outside its recipient's
/// availability windows.
enum GateDecision {
    /// Run now.
    Proceed,
    /// Re-enqueued for the next open window; this execution stops here.
    Extended,
    /// The step does not bypass gating: cancel it and advance the chain.
    Skip,
}

/// How one attempt at the step body ended. Errors from any part of the
/// body (attachment fetch, unsnooze delegation, send) share a single
/// capture path in `execute`.
enum StepOutcome {
    /// The sender ran and reported a handled status.
    Sent(SendOutcome),
    /// A snooze completion was delegated; the unsnooze path manages its
    /// own chain continuation.
    Unsnoozed,
}

/// Executes jobs one at a time against injected collaborators.
pub struct JobRunner {
    deps: RunnerDeps,
}

impl JobRunner {
    pub fn new(deps: RunnerDeps) -> Self {
        Self { deps }
    }

    /// Execute one job.
    ///
    /// Returns the job in its final state for this invocation (the digest
    /// follower, when a canceled DELAY/DIGEST job was superseded), or
    /// `None` when the job was canceled with no follower. A missing
    /// job is fatal. Unclassified collaborator errors are recorded against
    /// the job and then returned so the outer queue can retry or
    /// dead-letter.
    #[tracing::instrument(
        skip(self),
        fields(job_id = %command.job_id, environment_id = %command.environment_id)
    )]
    pub async fn execute(&self, command: ExecuteCommand) -> EngineResult<Option<Job>> {
        let job = self
            .deps
            .jobs
            .find(&command.environment_id, &command.job_id)
            .await?
            .ok_or_else(|| EngineError::JobNotFound(command.job_id.clone()))?;

        self.deps.step_runs.record(&job, StepRun::running()).await?;

        let mut job = match cancellation::evaluate(self.deps.jobs.as_ref(), &job).await? {
            CancellationDecision::Proceed => job,
            CancellationDecision::ResumeAs(follower) => {
                info!(
                    canceled_job_id = %job.id,
                    follower_job_id = %follower.id,
                    "canceled digest superseded, resuming as follower"
                );
                *follower
            }
            CancellationDecision::Halt => {
                debug!(job_id = %job.id, "job canceled with no follower, halting branch");
                self.deps
                    .step_runs
                    .record(&job, StepRun::canceled("canceled before execution"))
                    .await?;
                self.release_attachments(&job).await;
                return Ok(None);
            }
        };

        let notification = self
            .deps
            .notifications
            .find(&job.environment_id, &job.notification_id)
            .await?
            .ok_or_else(|| {
                EngineError::Store(format!(
                    "notification {} missing for job {}",
                    job.notification_id, job.id
                ))
            })?;

        if !notification.critical
            && self
                .deps
                .flags
                .schedule_gating_enabled(&job.environment_id)
                .await
        {
            match self.apply_schedule_gate(&mut job).await? {
                GateDecision::Proceed => {}
                GateDecision::Extended => return Ok(Some(job)),
                GateDecision::Skip => {
                    self.deps
                        .jobs
                        .update_status(&job.environment_id, &job.id, JobStatus::Canceled)
                        .await?;
                    job.status = JobStatus::Canceled;
                    self.deps
                        .step_runs
                        .record(&job, StepRun::skipped("outside of recipient schedule"))
                        .await?;
                    debug!(job_id = %job.id, "step outside recipient schedule, skipped");
                    self.advance_chain(&job).await?;
                    self.release_attachments(&job).await;
                    return Ok(Some(job));
                }
            }
        }

        self.deps
            .jobs
            .update_status(&job.environment_id, &job.id, JobStatus::Running)
            .await?;
        job.status = JobStatus::Running;

        let step_result = self.run_step(&job, &notification).await;

        let mut suppress_advance = false;
        let mut final_error: Option<String> = None;
        let mut propagate: Option<EngineError> = None;

        match step_result {
            Ok(StepOutcome::Unsnoozed) => {
                self.release_attachments(&job).await;
                return Ok(Some(job));
            }
            Ok(StepOutcome::Sent(SendOutcome::Success)) => {
                self.deps
                    .jobs
                    .update_status(&job.environment_id, &job.id, JobStatus::Completed)
                    .await?;
                job.status = JobStatus::Completed;
                self.deps.step_runs.record(&job, StepRun::completed()).await?;
                info!(job_id = %job.id, "job completed");
            }
            Ok(StepOutcome::Sent(SendOutcome::Failed { error_message })) => {
                self.deps
                    .jobs
                    .update_status(&job.environment_id, &job.id, JobStatus::Failed)
                    .await?;
                job.status = JobStatus::Failed;
                self.deps
                    .step_runs
                    .record(&job, StepRun::failed(ERROR_CODE_DELIVERY, &error_message))
                    .await?;
                warn!(job_id = %job.id, error = %error_message, "delivery failed");
                if job.halt_on_failure {
                    self.deps
                        .jobs
                        .cancel_pending(&PendingJobsFilter::siblings_of(&job))
                        .await?;
                    suppress_advance = true;
                }
                final_error = Some(error_message);
            }
            Ok(StepOutcome::Sent(SendOutcome::Skipped)) => {
                self.deps
                    .jobs
                    .update_status(&job.environment_id, &job.id, JobStatus::Canceled)
                    .await?;
                job.status = JobStatus::Canceled;
                self.deps
                    .step_runs
                    .record(&job, StepRun::canceled("delivery skipped by provider"))
                    .await?;
                debug!(job_id = %job.id, "delivery skipped by provider");
            }
            Err(err) => {
                self.deps
                    .jobs
                    .update_status(&job.environment_id, &job.id, JobStatus::Failed)
                    .await?;
                job.status = JobStatus::Failed;
                self.deps
                    .step_runs
                    .record(&job, StepRun::failed(ERROR_CODE_EXECUTION, err.to_string()))
                    .await?;
                error!(job_id = %job.id, error = %err, "job execution failed");
                let backoff = err.is_backoff();
                if job.halt_on_failure && !backoff {
                    self.deps
                        .jobs
                        .cancel_pending(&PendingJobsFilter::siblings_of(&job))
                        .await?;
                }
                if job.halt_on_failure || backoff {
                    suppress_advance = true;
                }
                final_error = Some(err.to_string());
                propagate = Some(err);
            }
        }

        let advance_result = if suppress_advance {
            self.finalize_workflow_run(&job, final_error).await;
            Ok(())
        } else {
            self.advance_chain(&job).await
        };
        self.release_attachments(&job).await;

        // Unclassified errors are re-thrown after bookkeeping so the outer
        // queue sees a failure signal.
        if let Some(err) = propagate {
            return Err(err);
        }
        advance_result?;
        Ok(Some(job))
    }

    /// The step body: fetch attachments, divert snooze completions, send.
    ///
    /// Any error raised here is bookkept by `execute` as a FAILED outcome
    /// before being re-thrown, the same way for all three calls.
    async fn run_step(&self, job: &Job, notification: &Notification) -> EngineResult<StepOutcome> {
        let attachments = self.deps.attachments.fetch(&job.attachments).await?;

        if job.is_snooze_completion() {
            debug!(job_id = %job.id, "snooze completion, delegating to unsnooze processor");
            self.deps.unsnooze.process(job).await?;
            return Ok(StepOutcome::Unsnoozed);
        }

        let outcome = self
            .deps
            .sender
            .send(SendContext {
                job,
                notification,
                attachments: &attachments,
            })
            .await?;
        Ok(StepOutcome::Sent(outcome))
    }

    /// Gate a non-critical job on the recipient's availability schedule.
    ///
    /// Evaluation order, pinned by tests: extension for DELAY/DIGEST steps
    /// first (bounded by [`MAX_SCHEDULE_EXTENSIONS`]; a capped job falls
    /// through and sends), then the always-bypass step table, then skip.
    async fn apply_schedule_gate(&self, job: &mut Job) -> EngineResult<GateDecision> {
        let schedule = self
            .deps
            .schedules
            .schedule_for(&job.environment_id, &job.organization_id, &job.subscriber_id)
            .await?;
        let Some(schedule) = schedule else {
            return Ok(GateDecision::Proceed);
        };
        if !schedule.is_enabled {
            return Ok(GateDecision::Proceed);
        }

        let timezone = self
            .deps
            .subscribers
            .find(&job.subscriber_id)
            .await?
            .and_then(|subscriber| subscriber.timezone)
            .and_then(|name| name.parse::<Tz>().ok());

        let now = Utc::now();
        if is_within_schedule(Some(&schedule), now, timezone) {
            return Ok(GateDecision::Proceed);
        }

        if job.step_type.supports_extension() {
            let response = self.deps.bridge.execute(job).await?;
            if response.extend_to_schedule.unwrap_or(false) {
                if job.schedule_extensions < MAX_SCHEDULE_EXTENSIONS {
                    // An unchanged result means the schedule has no window
                    // to extend into; requeuing would burn extensions on
                    // zero-delay cycles through the queue.
                    let resume_at = next_available_time(Some(&schedule), now, timezone);
                    if resume_at <= now {
                        debug!(
                            job_id = %job.id,
                            "no future window to extend into, sending"
                        );
                        return Ok(GateDecision::Proceed);
                    }

                    self.deps
                        .jobs
                        .mark_delayed_with_extension(&job.environment_id, &job.id)
                        .await?;
                    job.status = JobStatus::Delayed;
                    job.schedule_extensions += 1;

                    let delay = (resume_at - now).to_std().unwrap_or_default();
                    self.deps.delayed_jobs.queue_job(job, delay).await?;
                    self.deps
                        .step_runs
                        .record(job, StepRun::delayed("extended to next open schedule window"))
                        .await?;
                    info!(
                        job_id = %job.id,
                        extensions = job.schedule_extensions,
                        delay_secs = delay.as_secs(),
                        "extended job to next open schedule window"
                    );
                    return Ok(GateDecision::Extended);
                }
                debug!(
                    job_id = %job.id,
                    "extension cap reached, sending despite closed schedule"
                );
                return Ok(GateDecision::Proceed);
            }
        }

        if job.step_type.bypasses_schedule() {
            return Ok(GateDecision::Proceed);
        }
        Ok(GateDecision::Skip)
    }

    /// Advance the chain past `from`.
    ///
    /// Looks up the job whose parent is the current job and hands it to the
    /// next-job enqueuer. Skips cascade: a job the enqueuer rejects by step
    /// conditions is marked SKIPPED and the loop continues with it as the
    /// new current job. A chain with no next job finalizes the workflow
    /// run.
    ///
    /// When enqueuing fails, the next job is marked FAILED; with a
    /// halt-on-failure policy (and a non-backoff error) the workflow run is
    /// finalized and pending siblings are canceled, with either halt or
    /// backoff the loop stops, and otherwise the loop continues using the
    /// failed job as current. That last rule is legacy behavior kept
    /// deliberately; see DESIGN.md.
    async fn advance_chain(&self, from: &Job) -> EngineResult<()> {
        let mut current = from.clone();
        loop {
            let next = self
                .deps
                .jobs
                .find_by_parent(&current.environment_id, &current.id)
                .await?;
            let Some(mut next_job) = next else {
                debug!(job_id = %current.id, "chain end reached");
                self.finalize_workflow_run(&current, None).await;
                return Ok(());
            };

            match self.deps.next_jobs.add(&next_job).await {
                Ok(outcome) if outcome.step_status == EnqueueStatus::Skipped => {
                    self.deps
                        .jobs
                        .update_status(&next_job.environment_id, &next_job.id, JobStatus::Skipped)
                        .await?;
                    next_job.status = JobStatus::Skipped;
                    self.deps
                        .step_runs
                        .record(&next_job, StepRun::skipped("skipped by step conditions"))
                        .await?;
                    debug!(job_id = %next_job.id, "next job skipped by conditions, cascading");
                    self.release_attachments(&next_job).await;
                    current = next_job;
                }
                Ok(_) => {
                    debug!(job_id = %next_job.id, "next job queued");
                    return Ok(());
                }
                Err(err) => {
                    self.deps
                        .jobs
                        .update_status(&next_job.environment_id, &next_job.id, JobStatus::Failed)
                        .await?;
                    next_job.status = JobStatus::Failed;
                    self.deps
                        .step_runs
                        .record(&next_job, StepRun::failed(ERROR_CODE_ENQUEUE, err.to_string()))
                        .await?;
                    self.release_attachments(&next_job).await;

                    let backoff = err.is_backoff();
                    if next_job.halt_on_failure && !backoff {
                        error!(job_id = %next_job.id, error = %err, "enqueue failed, halting chain");
                        self.finalize_workflow_run(&next_job, Some(err.to_string()))
                            .await;
                        self.deps
                            .jobs
                            .cancel_pending(&PendingJobsFilter::siblings_of(&next_job))
                            .await?;
                        return Ok(());
                    }
                    if next_job.halt_on_failure || backoff {
                        warn!(job_id = %next_job.id, error = %err, "enqueue deferred to external retry");
                        return Ok(());
                    }
                    warn!(
                        job_id = %next_job.id,
                        error = %err,
                        "enqueue failed without halt policy, continuing past job"
                    );
                    current = next_job;
                }
            }
        }
    }

    /// Best-effort finalization of the workflow run's delivery lifecycle.
    async fn finalize_workflow_run(&self, job: &Job, error: Option<String>) {
        let update = DeliveryLifecycleUpdate {
            notification_id: job.notification_id.clone(),
            environment_id: job.environment_id.clone(),
            organization_id: job.organization_id.clone(),
            subscriber_id: job.subscriber_id.clone(),
            error,
        };
        if let Err(err) = self.deps.workflow_runs.update_delivery_lifecycle(update).await {
            error!(
                notification_id = %job.notification_id,
                error = %err,
                "failed to update workflow run delivery lifecycle"
            );
        }
    }

    /// Best-effort release of a job's attachment payloads.
    async fn release_attachments(&self, job: &Job) {
        if job.attachments.is_empty() {
            return;
        }
        if let Err(err) = self.deps.attachments.release(&job.attachments).await {
            warn!(job_id = %job.id, error = %err, "failed to release attachments");
        }
    }
}
