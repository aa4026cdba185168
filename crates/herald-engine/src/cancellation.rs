//! Digest/delay cancellation resolution.
//!
//! A DELAY or DIGEST job found CANCELED at the start of execution may have
//! been superseded rather than abandoned: when later trigger events opened
//! a fresh digest window, a sibling DIGEST job in DELAYED status carries
//! the work forward. Execution is then re-assigned to that follower and the
//! canceled original is dropped without further side effects.

use crate::error::EngineResult;
use crate::ports::JobStore;
use crate::types::{Job, JobStatus, StepType};

/// What to do with a job after checking its cancellation state.
#[derive(Debug)]
pub enum CancellationDecision {
    /// Not canceled (or not a DELAY/DIGEST step): execute as-is.
    Proceed,
    /// Canceled with no follower: terminate this branch of the chain.
    Halt,
    /// Canceled but superseded: continue execution as this follower job.
    ResumeAs(Box<Job>),
}

/// Whether `candidate` is an active digest follower for `canceled`: a
/// sibling DIGEST job in DELAYED status sharing transaction, recipient,
/// template, and digest key/value, with no merge target.
pub fn is_active_follower(candidate: &Job, canceled: &Job) -> bool {
    if candidate.id == canceled.id
        || candidate.step_type != StepType::Digest
        || candidate.status != JobStatus::Delayed
        || candidate.transaction_id != canceled.transaction_id
        || candidate.subscriber_id != canceled.subscriber_id
        || candidate.template_id != canceled.template_id
    {
        return false;
    }

    let canceled_digest = canceled.digest.as_ref();
    let Some(candidate_digest) = candidate.digest.as_ref() else {
        return false;
    };
    if candidate_digest.merged_into.is_some() {
        return false;
    }

    candidate_digest.digest_key == canceled_digest.and_then(|d| d.digest_key.clone())
        && candidate_digest.digest_value == canceled_digest.and_then(|d| d.digest_value.clone())
}

/// Resolve the cancellation state of `job` before executing it.
pub async fn evaluate(store: &dyn JobStore, job: &Job) -> EngineResult<CancellationDecision> {
    if !matches!(job.step_type, StepType::Delay | StepType::Digest)
        || job.status != JobStatus::Canceled
    {
        return Ok(CancellationDecision::Proceed);
    }

    let siblings = store
        .find_digest_jobs(
            &job.environment_id,
            &job.transaction_id,
            &job.subscriber_id,
            &job.template_id,
        )
        .await?;

    match siblings
        .into_iter()
        .find(|candidate| is_active_follower(candidate, job))
    {
        Some(follower) => Ok(CancellationDecision::ResumeAs(Box::new(follower))),
        None => Ok(CancellationDecision::Halt),
    }
}
