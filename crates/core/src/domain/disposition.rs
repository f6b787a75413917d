// Message Disposition

use super::entity::TagReport;

/// What the queue driver does with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processing finished (successfully or not); remove the message
    Delete,
    /// Transient condition; let the message become visible again later
    Requeue,
    /// Still working; keep the message hidden from other consumers
    ExtendLease,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposition::Delete => write!(f, "DELETE"),
            Disposition::Requeue => write!(f, "REQUEUE"),
            Disposition::ExtendLease => write!(f, "EXTEND_LEASE"),
        }
    }
}

/// Why a message reached its final disposition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Payload could not be decoded
    Malformed(String),
    /// Every tag landed on every resolved entity (or there was nothing to apply)
    Tagged(TagReport),
    /// Import completed but no entity matched the target name and branch
    NoEntities,
    /// The remote import job itself failed
    ImportFailed(String),
    /// Deadline reached before the import job became terminal
    StillPending,
    /// Entity lookup failed at the transport or API level
    ResolutionFailed(String),
    /// At least one (entity, tag) pair failed
    TaggingIncomplete(TagReport),
    /// Processing of the message panicked
    Crashed(String),
}

impl Verdict {
    /// Whether another delivery could change the result
    pub fn is_retryable(&self) -> bool {
        match self {
            Verdict::StillPending
            | Verdict::ResolutionFailed(_)
            | Verdict::TaggingIncomplete(_)
            | Verdict::Crashed(_) => true,
            Verdict::Malformed(_)
            | Verdict::Tagged(_)
            | Verdict::NoEntities
            | Verdict::ImportFailed(_) => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Malformed(_) => "malformed",
            Verdict::Tagged(_) => "tagged",
            Verdict::NoEntities => "no_entities",
            Verdict::ImportFailed(_) => "import_failed",
            Verdict::StillPending => "still_pending",
            Verdict::ResolutionFailed(_) => "resolution_failed",
            Verdict::TaggingIncomplete(_) => "tagging_incomplete",
            Verdict::Crashed(_) => "crashed",
        }
    }
}

/// Final result of one processing attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub disposition: Disposition,
    pub verdict: Verdict,
    pub attempt_number: u32,
}

impl Outcome {
    /// Retryable verdicts requeue while the budget lasts; everything else is deleted
    pub fn decide(verdict: Verdict, attempt_number: u32, max_attempts: u32) -> Self {
        let disposition = if verdict.is_retryable() && attempt_number < max_attempts {
            Disposition::Requeue
        } else {
            Disposition::Delete
        };
        Self {
            disposition,
            verdict,
            attempt_number,
        }
    }

    /// Retryable verdict that ran out of attempts
    pub fn is_exhausted(&self) -> bool {
        self.verdict.is_retryable() && self.disposition == Disposition::Delete
    }
}
