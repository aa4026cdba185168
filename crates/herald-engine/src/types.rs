//! Engine types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of a workflow instance targeted at one recipient.
///
/// Jobs of a single trigger share a `transaction_id` and form a forward
/// chain through `parent_id` back-references: the job whose parent is job N
/// is job N+1. Exactly one job exists per step per transaction per
/// recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub environment_id: String,
    pub organization_id: String,
    /// The workflow-trigger instance this job belongs to.
    pub notification_id: String,
    /// Groups all jobs of one workflow trigger.
    pub transaction_id: String,
    /// Chain ordering. `None` for the first job of a chain.
    pub parent_id: Option<String>,
    pub subscriber_id: String,
    pub template_id: String,
    pub step_type: StepType,
    pub status: JobStatus,
    /// Recipient-provided trigger data.
    #[serde(default)]
    pub payload: Value,
    pub digest: Option<DigestMetadata>,
    pub delay: Option<DelayMetadata>,
    /// How many times this job has been pushed forward to the next open
    /// schedule window. Never exceeds [`crate::MAX_SCHEDULE_EXTENSIONS`].
    #[serde(default)]
    pub schedule_extensions: u32,
    /// Per-step policy: a failure here cancels the remainder of the chain.
    #[serde(default)]
    pub halt_on_failure: bool,
    /// Recipient-facing channel overrides, passed through to the sender.
    #[serde(default)]
    pub overrides: Value,
    /// References into external attachment storage.
    #[serde(default)]
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Whether this execution is the completion of a snoozed in-app
    /// notification: an IN_APP step carrying delay metadata whose payload
    /// is marked `unsnooze`. These executions are handed to the unsnooze
    /// processor, which manages its own chain continuation.
    pub fn is_snooze_completion(&self) -> bool {
        self.step_type == StepType::InApp
            && self.delay.is_some()
            && self
                .payload
                .get("unsnooze")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

/// Step type of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// The synthetic first step of every chain.
    Trigger,
    InApp,
    /// Pauses the chain for a configured duration.
    Delay,
    /// Batches multiple trigger events into one delivery.
    Digest,
    Email,
    Push,
    Sms,
    Chat,
    Custom,
}

impl StepType {
    /// Steps that run even when the recipient's schedule is closed.
    /// Non-channel steps never reach the recipient directly, and in-app
    /// messages land in an inbox the recipient reads on their own time.
    pub fn bypasses_schedule(self) -> bool {
        matches!(self, Self::Trigger | Self::InApp | Self::Delay | Self::Digest)
    }

    /// Steps whose execution can be extended to the next open schedule
    /// window instead of firing immediately.
    pub fn supports_extension(self) -> bool {
        matches!(self, Self::Delay | Self::Digest)
    }
}

/// Current status of a job.
///
/// Transitions are monotonic within one execution: a terminal status is
/// never left, except that a `Delayed` job re-enters `Running` when the
/// external queue re-dispatches it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be picked up.
    #[default]
    Pending,
    /// Currently executing.
    Running,
    /// Pushed forward; an external timer will re-dispatch it.
    Delayed,
    /// Delivery succeeded.
    Completed,
    /// Delivery or execution failed.
    Failed,
    /// Canceled, superseded, or skipped by schedule gating.
    Canceled,
    /// Skipped by step conditions during chain advancement.
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Canceled | Self::Skipped
        )
    }
}

/// Digest bookkeeping carried by DIGEST jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestMetadata {
    /// The trigger events batched into this digest.
    #[serde(default)]
    pub events: Vec<Value>,
    pub digest_key: Option<String>,
    pub digest_value: Option<String>,
    /// Set when this digest's events were folded into another job; a merged
    /// digest is no longer an active follower candidate.
    pub merged_into: Option<String>,
}

/// Delay configuration carried by DELAY steps and snoozed IN_APP steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DelayMetadata {
    pub amount_ms: u64,
}

/// The workflow-trigger instance that owns a set of jobs. Immutable and
/// read-only from the runner's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Critical notifications bypass schedule gating entirely.
    #[serde(default)]
    pub critical: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use test_case::test_case;

    fn job(step_type: StepType) -> Job {
        Job {
            id: "job-1".into(),
            environment_id: "env-1".into(),
            organization_id: "org-1".into(),
            notification_id: "notification-1".into(),
            transaction_id: "transaction-1".into(),
            parent_id: None,
            subscriber_id: "subscriber-1".into(),
            template_id: "template-1".into(),
            step_type,
            status: JobStatus::Pending,
            payload: Value::Null,
            digest: None,
            delay: None,
            schedule_extensions: 0,
            halt_on_failure: false,
            overrides: Value::Null,
            attachments: vec![],
            created_at: Utc::now(),
        }
    }

    #[test_case(StepType::Trigger, true; "trigger bypasses")]
    #[test_case(StepType::InApp, true; "in-app bypasses")]
    #[test_case(StepType::Delay, true; "delay bypasses")]
    #[test_case(StepType::Digest, true; "digest bypasses")]
    #[test_case(StepType::Email, false; "email is gated")]
    #[test_case(StepType::Push, false; "push is gated")]
    #[test_case(StepType::Sms, false; "sms is gated")]
    #[test_case(StepType::Chat, false; "chat is gated")]
    #[test_case(StepType::Custom, false; "custom is gated")]
    fn schedule_bypass_table(step_type: StepType, expected: bool) {
        assert_eq!(step_type.bypasses_schedule(), expected);
    }

    #[test_case(StepType::Delay, true; "delay extends")]
    #[test_case(StepType::Digest, true; "digest extends")]
    #[test_case(StepType::Trigger, false; "trigger does not extend")]
    #[test_case(StepType::InApp, false; "in-app does not extend")]
    #[test_case(StepType::Email, false; "email does not extend")]
    fn extension_table(step_type: StepType, expected: bool) {
        assert_eq!(step_type.supports_extension(), expected);
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(JobStatus::Skipped.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Delayed.is_terminal());
    }

    #[test]
    fn snooze_completion_requires_all_three_markers() {
        let mut snoozed = job(StepType::InApp);
        snoozed.delay = Some(DelayMetadata { amount_ms: 60_000 });
        snoozed.payload = serde_json::json!({ "unsnooze": true });
        assert!(snoozed.is_snooze_completion());

        let mut no_delay = snoozed.clone();
        no_delay.delay = None;
        assert!(!no_delay.is_snooze_completion());

        let mut no_marker = snoozed.clone();
        no_marker.payload = serde_json::json!({ "unsnooze": false });
        assert!(!no_marker.is_snooze_completion());

        let mut wrong_type = snoozed.clone();
        wrong_type.step_type = StepType::Delay;
        assert!(!wrong_type.is_snooze_completion());
    }
}
