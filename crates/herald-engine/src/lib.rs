//! Job execution engine for Herald notification workflows.
//!
//! A workflow trigger produces a chain of jobs, one per step per recipient,
//! linked by parent-id back-references. An external queue invokes
//! [`JobRunner::execute`] with one job at a time; the runner gates the step
//! on the recipient's weekly availability schedule, delegates delivery to a
//! message-sending collaborator, records the outcome, and advances the
//! chain by enqueuing the next job, unless the outcome demands halting.
//!
//! All external concerns (persistence, delivery, feature flags, attachment
//! storage) are collaborator traits in [`ports`], injected through
//! [`RunnerDeps`]. The engine owns no I/O of its own.

pub mod cancellation;
mod error;
mod ports;
mod runner;
mod types;

pub use cancellation::{CancellationDecision, is_active_follower};
pub use error::{EngineError, EngineResult};
pub use ports::{
    Attachment, AttachmentStore, BridgeExecutor, BridgeResponse, DelayedJobQueue,
    DeliveryLifecycleUpdate, EnqueueOutcome, EnqueueStatus, FeatureFlags, JobStore, MessageSender,
    NextJobEnqueuer, NotificationStore, PendingJobsFilter, ScheduleProvider, SendContext,
    SendOutcome, StepRun, StepRunSink, StepRunStatus, SubscriberInfo, SubscriberStore,
    UnsnoozeProcessor, WorkflowRunUpdater,
};
pub use runner::{ExecuteCommand, JobRunner, MAX_SCHEDULE_EXTENSIONS, RunnerDeps};
pub use types::{DelayMetadata, DigestMetadata, Job, JobStatus, Notification, StepType};
