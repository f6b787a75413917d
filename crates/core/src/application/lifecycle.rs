//! Message Lifecycle Engine
//!
//! Drives one delivery of a message through
//! `Decoding -> Polling -> Resolving -> Tagging -> Finalized`
//! and turns the result into a queue disposition. The attempt number is an
//! input owned by the transport; the engine never counts attempts itself.

use crate::application::decoder::decode;
use crate::application::poller::StatusPoller;
use crate::application::resolver::EntityResolver;
use crate::application::tag_applicator::TagApplicator;
use crate::application::worker::constants::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_PROCESSING, DEFAULT_STATUS_POLL_INTERVAL,
};
use crate::domain::{
    Disposition, EntityRef, ImportStatus, ImportTagRequest, Outcome, ProcessingAttempt,
    TagReport, Verdict,
};
use crate::port::{EntityCatalog, ImportStatusSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Engine limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Wall-clock budget for one attempt
    pub max_processing: Duration,
    /// Deliveries allowed before a retryable failure is abandoned
    pub max_attempts: u32,
    /// Fixed interval between job status queries
    pub status_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_processing: DEFAULT_MAX_PROCESSING,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
        }
    }
}

/// Engine state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Decoding,
    Polling(ImportTagRequest),
    Resolving(ImportTagRequest),
    Tagging(ImportTagRequest, Vec<EntityRef>),
    /// Request is absent only when decoding failed
    Finalized(Option<ImportTagRequest>, Verdict),
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Decoding => "decoding",
            Phase::Polling(_) => "polling",
            Phase::Resolving(_) => "resolving",
            Phase::Tagging(..) => "tagging",
            Phase::Finalized(..) => "finalized",
        }
    }
}

pub struct LifecycleEngine {
    poller: StatusPoller,
    resolver: EntityResolver,
    applicator: TagApplicator,
    config: EngineConfig,
}

impl LifecycleEngine {
    pub fn new(
        status_source: Arc<dyn ImportStatusSource>,
        catalog: Arc<dyn EntityCatalog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            poller: StatusPoller::new(status_source, config.status_poll_interval),
            resolver: EntityResolver::new(Arc::clone(&catalog)),
            applicator: TagApplicator::new(catalog),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process one delivery of a raw message to a final outcome
    ///
    /// Never fails: every error becomes a verdict and a disposition.
    pub async fn process(&self, raw: &[u8], attempt_number: u32) -> Outcome {
        let attempt = ProcessingAttempt::start(attempt_number, self.config.max_processing);
        let mut phase = Phase::Decoding;

        loop {
            phase = match phase {
                Phase::Finalized(request, verdict) => {
                    let outcome = Outcome::decide(verdict, attempt_number, self.config.max_attempts);
                    report(request.as_ref(), &outcome, self.config.max_attempts);
                    debug!(elapsed_ms = attempt.elapsed().as_millis() as u64, "Attempt finished");
                    return outcome;
                }
                other => {
                    let from = other.name();
                    let next = self.advance(other, raw, &attempt).await;
                    debug!(from, to = next.name(), attempt = attempt_number, "Phase transition");
                    next
                }
            };
        }
    }

    /// Run a single transition
    pub async fn advance(&self, phase: Phase, raw: &[u8], attempt: &ProcessingAttempt) -> Phase {
        match phase {
            Phase::Decoding => match decode(raw) {
                Ok(request) => {
                    info!(
                        target_name = %request.target_name,
                        branch = %request.branch,
                        org_id = %request.org_id,
                        attempt = attempt.attempt_number,
                        "Processing import tag request"
                    );
                    Phase::Polling(request)
                }
                Err(e) => Phase::Finalized(None, Verdict::Malformed(e.to_string())),
            },

            Phase::Polling(request) => {
                let status = self
                    .poller
                    .await_completion(&request.import_job_reference, attempt.deadline)
                    .await;

                match status {
                    ImportStatus::Complete if request.tags.is_empty() => {
                        info!(target_name = %request.target_name, branch = %request.branch, "Import complete, no tags to apply");
                        Phase::Finalized(Some(request), Verdict::Tagged(TagReport::default()))
                    }
                    ImportStatus::Complete => {
                        info!(target_name = %request.target_name, branch = %request.branch, "Import complete, resolving entities");
                        Phase::Resolving(request)
                    }
                    ImportStatus::Failed(reason) => {
                        Phase::Finalized(Some(request), Verdict::ImportFailed(reason))
                    }
                    ImportStatus::Pending | ImportStatus::Unknown(_) => {
                        Phase::Finalized(Some(request), Verdict::StillPending)
                    }
                }
            }

            Phase::Resolving(request) => {
                match self
                    .resolver
                    .resolve(&request.org_id, &request.target_name, &request.branch, attempt.deadline)
                    .await
                {
                    Ok(entities) if entities.is_empty() => {
                        Phase::Finalized(Some(request), Verdict::NoEntities)
                    }
                    Ok(entities) => {
                        info!(
                            target_name = %request.target_name,
                            branch = %request.branch,
                            entities = entities.len(),
                            "Entities resolved"
                        );
                        Phase::Tagging(request, entities)
                    }
                    Err(e) => Phase::Finalized(Some(request), Verdict::ResolutionFailed(e.to_string())),
                }
            }

            Phase::Tagging(request, entities) => {
                let report = self
                    .applicator
                    .apply(&request.org_id, &entities, &request.tags, attempt.deadline)
                    .await;

                let verdict = if report.is_complete_success() {
                    Verdict::Tagged(report)
                } else {
                    Verdict::TaggingIncomplete(report)
                };
                Phase::Finalized(Some(request), verdict)
            }

            finalized @ Phase::Finalized(..) => finalized,
        }
    }
}

/// Log a final outcome with enough context to replay or fix it by hand
pub fn report(request: Option<&ImportTagRequest>, outcome: &Outcome, max_attempts: u32) {
    let target_name = request.map_or("-", |r| r.target_name.as_str());
    let branch = request.map_or("-", |r| r.branch.as_str());
    let org_id = request.map_or("-", |r| r.org_id.as_str());
    let attempt = outcome.attempt_number;
    let disposition = outcome.disposition;
    let reason = outcome.verdict.label();

    match (&outcome.verdict, disposition) {
        (Verdict::Malformed(cause), _) => {
            error!(%disposition, attempt, reason, error = %cause, "Invalid message format, deleting");
        }
        (Verdict::Tagged(report), _) => {
            info!(
                target_name, branch, org_id, attempt, %disposition, reason,
                tagged = report.succeeded,
                entities = report.outcomes.len(),
                "Message processed successfully"
            );
        }
        (Verdict::NoEntities, _) => {
            info!(target_name, branch, org_id, attempt, %disposition, reason, "No entities found for target, deleting");
        }
        (Verdict::ImportFailed(cause), _) => {
            warn!(target_name, branch, org_id, attempt, %disposition, reason, error = %cause, "Upstream import failed, deleting without retry");
        }
        (verdict, Disposition::Requeue) => {
            warn!(
                target_name, branch, org_id, attempt, max_attempts, %disposition, reason,
                detail = %verdict_detail(verdict),
                "Attempt did not finish, requeueing"
            );
        }
        (verdict, _) => {
            error!(
                target_name, branch, org_id, attempt, max_attempts, %disposition, reason,
                detail = %verdict_detail(verdict),
                "Retry budget exhausted, abandoning message"
            );
            if let Verdict::TaggingIncomplete(report) = verdict {
                for failure in &report.failures {
                    error!(
                        target_name, branch, org_id,
                        entity_id = %failure.entity_id,
                        tag = %failure.tag,
                        error = %failure.cause,
                        "Tag never applied"
                    );
                }
            }
        }
    }
}

fn verdict_detail(verdict: &Verdict) -> String {
    match verdict {
        Verdict::Malformed(detail)
        | Verdict::ImportFailed(detail)
        | Verdict::ResolutionFailed(detail)
        | Verdict::Crashed(detail) => detail.clone(),
        Verdict::TaggingIncomplete(report) => format!(
            "{} of {} tag applications failed",
            report.failures.len(),
            report.attempted
        ),
        Verdict::StillPending => "import job not terminal before deadline".to_string(),
        Verdict::Tagged(_) => "tagged".to_string(),
        Verdict::NoEntities => "no entities".to_string(),
    }
}
